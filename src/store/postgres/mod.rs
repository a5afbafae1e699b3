//! PostgreSQL queue backend: atomic claim.
//!
//! A claim is one `UPDATE ... WHERE id IN (SELECT ... FOR UPDATE SKIP LOCKED) RETURNING`
//! statement. Concurrent claimants skip rows another transaction has locked instead of
//! waiting on them, and the lock, the checkout stamp and the read happen inside a single
//! statement, so no row is handed to two consumers while its lease is live.
//!
//! A checked out row becomes claimable again once its lease age strictly exceeds the TTL.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::{ConcurrencyModel, Queue};
use crate::stream::StopSignal;
use crate::types::{successful_ids, ConsumerMessage, Message, QueueMetrics, Receipt};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;

pub mod schema;

// SQL templates; `{table}` is replaced with the queue table name.
const INSERT_MESSAGES: &str = r#"
    INSERT INTO {table} (payload)
    SELECT unnest($1::bytea[]);
"#;

const CLAIM_MESSAGES: &str = r#"
    UPDATE {table}
    SET checkout = now()
    WHERE id IN (
        SELECT id
        FROM {table}
        WHERE checkout IS NULL
           OR ($2::double precision > 0
               AND checkout < now() - make_interval(secs => $2::double precision))
        ORDER BY checkout ASC NULLS FIRST, timestamp ASC, id ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    )
    RETURNING id, payload;
"#;

const DELETE_MESSAGES: &str = r#"
    DELETE FROM {table}
    WHERE id = ANY($1);
"#;

const COUNT_MESSAGES: &str = r#"
    SELECT COUNT(*),
           COUNT(*) FILTER (
               WHERE checkout IS NULL
                  OR ($1::double precision > 0
                      AND checkout < now() - make_interval(secs => $1::double precision))
           )
    FROM {table};
"#;

#[derive(Debug)]
struct Statements {
    insert: String,
    claim: String,
    delete: String,
    count: String,
}

impl Statements {
    fn render(table: &str) -> Self {
        Self {
            insert: INSERT_MESSAGES.replace("{table}", table),
            claim: CLAIM_MESSAGES.replace("{table}", table),
            delete: DELETE_MESSAGES.replace("{table}", table),
            count: COUNT_MESSAGES.replace("{table}", table),
        }
    }
}

/// Queue handle backed by a PostgreSQL table.
///
/// Clones share the pool and the stop flag.
#[derive(Debug, Clone)]
pub struct PostgresQueue {
    pool: PgPool,
    prefix: String,
    table: String,
    ttl: Duration,
    sql: Arc<Statements>,
    stop: Arc<StopSignal>,
}

impl PostgresQueue {
    /// Wrap an existing pool. Fails if the configured prefix is not a valid identifier.
    pub fn new(pool: PgPool, config: &Config) -> Result<Self> {
        crate::config::validate_identifier(&config.prefix)?;
        let table = crate::store::table_name(&config.prefix);
        Ok(Self {
            pool,
            prefix: config.prefix.clone(),
            sql: Arc::new(Statements::render(&table)),
            table,
            ttl: config.lease_ttl(),
            stop: Arc::new(StopSignal::new()),
        })
    }

    /// Open a pool for `config.dsn` and wrap it.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connection_timeout())
            .connect(&config.dsn)
            .await
            .map_err(|e| Error::ConnectionFailed {
                source: Box::new(e),
                context: "Failed to connect to postgres".into(),
            })?;

        Self::new(pool, config)
    }

    /// Get access to the underlying PgPool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn execute_all(&self, statements: Vec<String>, context: &str) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::transaction(e, format!("Failed to begin {}", context)))?;

        for stmt in &statements {
            sqlx::query(stmt)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::query(e, stmt.clone(), context.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::transaction(e, format!("Failed to commit {}", context)))
    }
}

#[async_trait]
impl Queue for PostgresQueue {
    async fn create(&self) -> Result<()> {
        self.execute_all(
            schema::create_statements(&self.prefix),
            &format!("create schema for {}", self.table),
        )
        .await?;
        tracing::debug!("Created queue table '{}'", self.table);
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        self.execute_all(
            schema::drop_statements(&self.prefix),
            &format!("drop schema for {}", self.table),
        )
        .await?;
        tracing::debug!("Dropped queue table '{}'", self.table);
        Ok(())
    }

    async fn publish(&self, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let payloads: Vec<Vec<u8>> = messages.iter().map(|m| m.payload.clone()).collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::transaction(e, "Failed to begin publish"))?;

        sqlx::query(&self.sql.insert)
            .bind(payloads)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::query(
                    e,
                    "INSERT_MESSAGES",
                    format!("Failed to publish {} messages to {}", messages.len(), self.table),
                )
            })?;

        tx.commit()
            .await
            .map_err(|e| Error::transaction(e, "Failed to commit publish"))?;

        tracing::debug!("Published {} messages to '{}'", messages.len(), self.table);
        Ok(())
    }

    async fn consume_batch(&self, size: usize) -> Result<Vec<ConsumerMessage>> {
        if size == 0 {
            return Ok(vec![]);
        }

        let messages = sqlx::query_as::<_, ConsumerMessage>(&self.sql.claim)
            .bind(size as i64)
            .bind(self.ttl.as_secs_f64())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::query(
                    e,
                    "CLAIM_MESSAGES",
                    format!("Failed to claim up to {} messages from {}", size, self.table),
                )
            })?;

        if !messages.is_empty() {
            tracing::debug!("Claimed {} messages from '{}'", messages.len(), self.table);
        }
        Ok(messages)
    }

    async fn commit(&self, receipts: &[Receipt]) -> Result<()> {
        let ids = successful_ids(receipts);
        if ids.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::transaction(e, "Failed to begin commit"))?;

        let deleted = sqlx::query(&self.sql.delete)
            .bind(&ids)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::query(
                    e,
                    "DELETE_MESSAGES",
                    format!("Failed to delete {} messages from {}", ids.len(), self.table),
                )
            })?
            .rows_affected();

        tx.commit()
            .await
            .map_err(|e| Error::transaction(e, "Failed to commit receipts"))?;

        tracing::debug!(
            "Committed {} receipts, deleted {} rows from '{}'",
            receipts.len(),
            deleted,
            self.table
        );
        Ok(())
    }

    async fn metrics(&self) -> Result<QueueMetrics> {
        let (total, available): (i64, i64) = sqlx::query_as(&self.sql.count)
            .bind(self.ttl.as_secs_f64())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::query(
                    e,
                    "COUNT_MESSAGES",
                    format!("Failed to count messages in {}", self.table),
                )
            })?;

        Ok(QueueMetrics {
            name: self.table.clone(),
            total_messages: total,
            available_messages: available,
            checked_out_messages: total - available,
        })
    }

    fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    fn table_name(&self) -> &str {
        &self.table
    }

    fn lease_ttl(&self) -> Duration {
        self.ttl
    }

    fn concurrency_model(&self) -> ConcurrencyModel {
        ConcurrencyModel::MultiProcess
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_render_table_name() {
        let sql = Statements::render("orders_q");
        assert!(sql.claim.contains("UPDATE orders_q"));
        assert!(sql.claim.contains("FROM orders_q"));
        assert!(sql.claim.contains("FOR UPDATE SKIP LOCKED"));
        assert!(!sql.claim.contains("{table}"));
        assert!(sql.insert.contains("INSERT INTO orders_q"));
        assert!(sql.delete.contains("DELETE FROM orders_q"));
        assert!(sql.count.contains("FROM orders_q"));
        assert!(sql.claim.contains("checkout < now() - make_interval"));
        assert!(!sql.claim.contains("<="));
    }
}

//! SQLite queue backend: two-step checkout.
//!
//! A claim selects candidate ids, then stamps them with an `UPDATE ... RETURNING`, both inside
//! one `BEGIN IMMEDIATE` transaction, so the write lock is held before the select and the busy
//! timeout applies while producers are writing. The update repeats the availability predicate,
//! so only rows that were still available when stamped come back to the caller.
//!
//! SQLite serializes writers per database file but gives no row locks. Run one consuming
//! process per file; concurrent claimants in other processes may see busy errors.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::{ConcurrencyModel, Queue};
use crate::stream::StopSignal;
use crate::types::{successful_ids, ConsumerMessage, Message, QueueMetrics, Receipt};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub mod schema;

use self::schema::NOW_MS;

/// Rows per INSERT/UPDATE/DELETE statement, well under SQLite's bound parameter limit.
const MAX_ROWS_PER_STATEMENT: usize = 500;

/// Row availability: never checked out, or checked out strictly longer than the lease ago.
/// Binds the lease in seconds twice.
const AVAILABLE: &str = "(checkout IS NULL OR (? > 0 AND (julianday('now') - julianday(checkout)) * 86400.0 > ?))";

fn is_memory_dsn(dsn: &str) -> bool {
    dsn.contains(":memory:") || dsn.contains("mode=memory")
}

#[derive(Debug)]
struct Statements {
    select_candidates: String,
    count: String,
}

impl Statements {
    fn render(table: &str) -> Self {
        Self {
            select_candidates: format!(
                "SELECT id FROM {table} WHERE {AVAILABLE} ORDER BY checkout ASC, timestamp ASC, id ASC LIMIT ?"
            ),
            count: format!(
                "SELECT COUNT(*), COALESCE(SUM(CASE WHEN {AVAILABLE} THEN 1 ELSE 0 END), 0) FROM {table}"
            ),
        }
    }
}

/// Queue handle backed by an SQLite table.
///
/// Clones share the pool and the stop flag.
#[derive(Debug, Clone)]
pub struct SqliteQueue {
    pool: SqlitePool,
    prefix: String,
    table: String,
    ttl: Duration,
    sql: Arc<Statements>,
    stop: Arc<StopSignal>,
}

impl SqliteQueue {
    /// Wrap an existing pool. Fails if the configured prefix is not a valid identifier.
    pub fn new(pool: SqlitePool, config: &Config) -> Result<Self> {
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
    ///
    /// The database file is created if missing. Every connection runs in WAL mode with a 5s
    /// busy timeout. In-memory databases get a single connection that is never recycled, so
    /// all users of the pool see the same data for the life of the pool.
    pub async fn connect(config: &Config) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.dsn)
            .map_err(|e| Error::InvalidConfig {
                field: "dsn".to_string(),
                message: e.to_string(),
            })?
            .create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connection_timeout());
        if is_memory_dsn(&config.dsn) {
            // The database lives only as long as its one connection.
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode=WAL")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout=5000")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await
            .map_err(|e| Error::ConnectionFailed {
                source: Box::new(e),
                context: "Failed to open sqlite database".into(),
            })?;

        Self::new(pool, config)
    }

    /// Get access to the underlying SqlitePool.
    pub fn pool(&self) -> &SqlitePool {
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

    fn ttl_secs(&self) -> f64 {
        self.ttl.as_secs_f64()
    }
}

#[async_trait]
impl Queue for SqliteQueue {
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

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::transaction(e, "Failed to begin publish"))?;

        for chunk in messages.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut query_builder: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("INSERT INTO {} (payload) ", self.table));
            query_builder.push_values(chunk, |mut b, message| {
                b.push_bind(message.payload.as_slice());
            });

            query_builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    Error::query(
                        e,
                        "INSERT_MESSAGES_DYNAMIC",
                        format!("Failed to publish {} messages to {}", chunk.len(), self.table),
                    )
                })?;
        }

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

        let ttl = self.ttl_secs();
        // Take the write lock before reading. A deferred transaction that reads first cannot
        // upgrade once another connection has committed, and fails without waiting.
        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| Error::transaction(e, "Failed to begin claim"))?;

        let candidates: Vec<i64> = sqlx::query_scalar(&self.sql.select_candidates)
            .bind(ttl)
            .bind(ttl)
            .bind(size as i64)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| {
                Error::query(
                    e,
                    "SELECT_CANDIDATES",
                    format!("Failed to select up to {} messages from {}", size, self.table),
                )
            })?;

        if candidates.is_empty() {
            tx.rollback()
                .await
                .map_err(|e| Error::transaction(e, "Failed to end empty claim"))?;
            return Ok(vec![]);
        }

        let mut claimed: HashMap<i64, Vec<u8>> = HashMap::with_capacity(candidates.len());
        for chunk in candidates.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "UPDATE {} SET checkout = {} WHERE id IN (",
                self.table, NOW_MS
            ));
            let mut separated = query_builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
            // Re-check availability so only rows still free are stamped.
            query_builder
                .push(" AND (checkout IS NULL OR (")
                .push_bind(ttl)
                .push(" > 0 AND (julianday('now') - julianday(checkout)) * 86400.0 > ")
                .push_bind(ttl)
                .push(")) RETURNING id, payload");

            let rows = query_builder
                .build_query_as::<ConsumerMessage>()
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| {
                    Error::query(
                        e,
                        "CLAIM_MESSAGES_DYNAMIC",
                        format!("Failed to stamp {} messages in {}", chunk.len(), self.table),
                    )
                })?;
            for row in rows {
                claimed.insert(row.id, row.payload);
            }
        }

        tx.commit()
            .await
            .map_err(|e| Error::transaction(e, "Failed to commit claim"))?;

        let messages: Vec<ConsumerMessage> = candidates
            .into_iter()
            .filter_map(|id| claimed.remove(&id).map(|payload| ConsumerMessage { id, payload }))
            .collect();

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

        let mut deleted = 0;
        for chunk in ids.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut query_builder: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("DELETE FROM {} WHERE id IN (", self.table));
            let mut separated = query_builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");

            deleted += query_builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    Error::query(
                        e,
                        "DELETE_MESSAGES_DYNAMIC",
                        format!("Failed to delete {} messages from {}", chunk.len(), self.table),
                    )
                })?
                .rows_affected();
        }

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
        let ttl = self.ttl_secs();
        let (total, available): (i64, i64) = sqlx::query_as(&self.sql.count)
            .bind(ttl)
            .bind(ttl)
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
        ConcurrencyModel::SingleProcess
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

//! AnyQueue enum for runtime backend selection.
//!
//! This module provides the `AnyQueue` enum which wraps the backend implementations and
//! exposes them through the [`Queue`] trait.

use super::*;
use crate::config::Config;
#[cfg(feature = "postgres")]
use crate::store::postgres::PostgresQueue;
#[cfg(feature = "sqlite")]
use crate::store::sqlite::SqliteQueue;

/// Runtime-selectable queue backend.
///
/// The backend is chosen from the DSN scheme when connecting.
#[derive(Clone, Debug)]
pub enum AnyQueue {
    /// PostgreSQL backend
    #[cfg(feature = "postgres")]
    Postgres(PostgresQueue),
    /// SQLite backend
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteQueue),
}

impl AnyQueue {
    /// Connect using a configuration object.
    ///
    /// Applies the pool size, connection timeout, table prefix and lease duration from
    /// `config`. The prefix is validated before any connection is opened.
    pub async fn connect(config: &Config) -> Result<Self> {
        crate::config::validate_identifier(&config.prefix)?;
        let backend = BackendType::detect(&config.dsn)?;

        match backend {
            #[cfg(feature = "postgres")]
            BackendType::Postgres => Ok(AnyQueue::Postgres(PostgresQueue::connect(config).await?)),
            #[cfg(feature = "sqlite")]
            BackendType::Sqlite => Ok(AnyQueue::Sqlite(SqliteQueue::connect(config).await?)),
        }
    }

    /// Connect using just a DSN, with the default prefix and no lease reclaim.
    ///
    /// # Example
    /// ```no_run
    /// # use rowq::store::any::AnyQueue;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let queue = AnyQueue::connect_with_dsn("sqlite://queue.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect_with_dsn(dsn: &str) -> Result<Self> {
        let config = Config::from_dsn(dsn);
        Self::connect(&config).await
    }
}

#[async_trait]
impl Queue for AnyQueue {
    async fn create(&self) -> Result<()> {
        match self {
            #[cfg(feature = "postgres")]
            AnyQueue::Postgres(q) => q.create().await,
            #[cfg(feature = "sqlite")]
            AnyQueue::Sqlite(q) => q.create().await,
        }
    }

    async fn destroy(&self) -> Result<()> {
        match self {
            #[cfg(feature = "postgres")]
            AnyQueue::Postgres(q) => q.destroy().await,
            #[cfg(feature = "sqlite")]
            AnyQueue::Sqlite(q) => q.destroy().await,
        }
    }

    async fn publish(&self, messages: &[Message]) -> Result<()> {
        match self {
            #[cfg(feature = "postgres")]
            AnyQueue::Postgres(q) => q.publish(messages).await,
            #[cfg(feature = "sqlite")]
            AnyQueue::Sqlite(q) => q.publish(messages).await,
        }
    }

    async fn consume_batch(&self, size: usize) -> Result<Vec<ConsumerMessage>> {
        match self {
            #[cfg(feature = "postgres")]
            AnyQueue::Postgres(q) => q.consume_batch(size).await,
            #[cfg(feature = "sqlite")]
            AnyQueue::Sqlite(q) => q.consume_batch(size).await,
        }
    }

    async fn commit(&self, receipts: &[Receipt]) -> Result<()> {
        match self {
            #[cfg(feature = "postgres")]
            AnyQueue::Postgres(q) => q.commit(receipts).await,
            #[cfg(feature = "sqlite")]
            AnyQueue::Sqlite(q) => q.commit(receipts).await,
        }
    }

    async fn metrics(&self) -> Result<QueueMetrics> {
        match self {
            #[cfg(feature = "postgres")]
            AnyQueue::Postgres(q) => q.metrics().await,
            #[cfg(feature = "sqlite")]
            AnyQueue::Sqlite(q) => q.metrics().await,
        }
    }

    fn stop_signal(&self) -> &StopSignal {
        match self {
            #[cfg(feature = "postgres")]
            AnyQueue::Postgres(q) => q.stop_signal(),
            #[cfg(feature = "sqlite")]
            AnyQueue::Sqlite(q) => q.stop_signal(),
        }
    }

    fn table_name(&self) -> &str {
        match self {
            #[cfg(feature = "postgres")]
            AnyQueue::Postgres(q) => q.table_name(),
            #[cfg(feature = "sqlite")]
            AnyQueue::Sqlite(q) => q.table_name(),
        }
    }

    fn lease_ttl(&self) -> Duration {
        match self {
            #[cfg(feature = "postgres")]
            AnyQueue::Postgres(q) => q.lease_ttl(),
            #[cfg(feature = "sqlite")]
            AnyQueue::Sqlite(q) => q.lease_ttl(),
        }
    }

    fn concurrency_model(&self) -> ConcurrencyModel {
        match self {
            #[cfg(feature = "postgres")]
            AnyQueue::Postgres(q) => q.concurrency_model(),
            #[cfg(feature = "sqlite")]
            AnyQueue::Sqlite(q) => q.concurrency_model(),
        }
    }

    fn backend_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "postgres")]
            AnyQueue::Postgres(q) => q.backend_name(),
            #[cfg(feature = "sqlite")]
            AnyQueue::Sqlite(q) => q.backend_name(),
        }
    }
}

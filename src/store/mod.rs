//! Queue abstraction for rowq.
//!
//! This module defines the [`Queue`] trait, the capability contract every backend satisfies,
//! and [`AnyQueue`], which selects a backend at runtime from the DSN.
//!
//! Two backends exist:
//! - [`postgres::PostgresQueue`] claims rows with a single `UPDATE ... FOR UPDATE SKIP LOCKED ... RETURNING`
//!   statement and is safe for any number of concurrent consumers.
//! - [`sqlite::SqliteQueue`] claims rows with a two-step checkout (select, then stamp) and is meant
//!   for a single consumer process per database file.

use crate::error::Result;
use crate::stream::StopSignal;
use crate::types::{ConsumerMessage, Message, QueueMetrics, Receipt};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

pub mod any;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use any::AnyQueue;

/// Concurrency model supported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyModel {
    /// Claims are atomic across any number of consumer processes.
    MultiProcess,
    /// Claims are only guaranteed disjoint for a single consumer process.
    SingleProcess,
}

/// The queue capability contract.
///
/// All storage effects are scoped to a storage transaction: a failed `publish` inserts nothing,
/// a claim stamps exactly the rows it returns, and `commit` deletes exactly the rows of its
/// successful receipts.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Ensure the backing table, sequence and index exist. Safe to call repeatedly.
    async fn create(&self) -> Result<()>;

    /// Drop the backing table (and sequence). Safe to call when nothing exists.
    async fn destroy(&self) -> Result<()>;

    /// Insert a batch of messages as one atomic unit.
    async fn publish(&self, messages: &[Message]) -> Result<()>;

    /// Claim up to `size` available rows.
    ///
    /// Rows never checked out come first, then rows whose lease has expired, each ordered by
    /// insertion time. Returns an empty vector when nothing is available.
    async fn consume_batch(&self, size: usize) -> Result<Vec<ConsumerMessage>>;

    /// Delete the rows of every successful receipt. Failed receipts and unknown ids are ignored.
    async fn commit(&self, receipts: &[Receipt]) -> Result<()>;

    /// Row counts for the backing table.
    async fn metrics(&self) -> Result<QueueMetrics>;

    /// Stop flag shared by every clone of this handle.
    fn stop_signal(&self) -> &StopSignal;

    /// Name of the backing table (`<prefix>q`).
    fn table_name(&self) -> &str;

    /// Lease duration after which a checked out row may be reclaimed. Zero disables reclaim.
    fn lease_ttl(&self) -> Duration;

    fn concurrency_model(&self) -> ConcurrencyModel;

    fn backend_name(&self) -> &'static str;

    /// Poll for batches and send them on `messages` until [`Queue::stop_consumer`] is called.
    ///
    /// Batches are sent back to back while the queue has work; an empty or failed poll sleeps
    /// for `pause` first. The channel is closed when the loop returns.
    async fn stream(
        &self,
        size: usize,
        messages: mpsc::Sender<Vec<ConsumerMessage>>,
        pause: Duration,
    ) {
        crate::stream::run(self, size, messages, pause).await
    }

    /// Ask a running stream to finish. Takes effect before its next poll.
    fn stop_consumer(&self) {
        self.stop_signal().stop();
    }

    fn is_stopped(&self) -> bool {
        self.stop_signal().is_stopped()
    }
}

/// Storage engine behind a DSN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    #[cfg(feature = "postgres")]
    Postgres,
    #[cfg(feature = "sqlite")]
    Sqlite,
}

impl BackendType {
    const POSTGRES_PREFIXES: &'static [&'static str] = &["postgres://", "postgresql://"];
    const SQLITE_PREFIXES: &'static [&'static str] = &["sqlite://", "sqlite:"];

    pub fn detect(dsn: &str) -> Result<Self> {
        if Self::POSTGRES_PREFIXES.iter().any(|p| dsn.starts_with(p)) {
            #[cfg(feature = "postgres")]
            return Ok(Self::Postgres);

            #[cfg(not(feature = "postgres"))]
            return Err(crate::error::Error::InvalidConfig {
                field: "dsn".to_string(),
                message: "Postgres backend is not enabled".to_string(),
            });
        }

        if Self::SQLITE_PREFIXES.iter().any(|p| dsn.starts_with(p)) {
            #[cfg(feature = "sqlite")]
            return Ok(Self::Sqlite);

            #[cfg(not(feature = "sqlite"))]
            return Err(crate::error::Error::InvalidConfig {
                field: "dsn".to_string(),
                message: "Sqlite backend is not enabled".to_string(),
            });
        }

        Err(crate::error::Error::InvalidConfig {
            field: "dsn".to_string(),
            message: format!("Unsupported DSN format: {}", dsn),
        })
    }
}

/// Table name for a queue prefix.
pub(crate) fn table_name(prefix: &str) -> String {
    format!("{}q", prefix)
}

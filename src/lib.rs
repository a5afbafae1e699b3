//! # rowq
//!
//! **rowq** is a durable message queue that keeps its messages as rows of a single SQL table.
//! No broker to operate: producers insert rows, consumers claim them under a lease and delete
//! them once processed.
//!
//! ## Features
//!
//! - **Two backends**: PostgreSQL claims with `FOR UPDATE SKIP LOCKED` and supports any number of
//!   concurrent consumers. SQLite uses a two-step checkout for a single consumer process.
//! - **Lease reclaim**: a claimed message that is never committed becomes available again once
//!   its lease expires.
//! - **Receipts**: consumers report success or failure per message; only successes are deleted.
//! - **Streaming**: a polling loop delivers batches on a bounded channel until stopped.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rowq::{Config, Message, Queue};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_dsn("sqlite://queue.db").with_lease_ttl(Duration::from_secs(30));
//! let queue = rowq::connect_with_config(&config).await?;
//! queue.create().await?;
//!
//! queue.publish(&[Message::from("a"), Message::from("b")]).await?;
//!
//! let batch = queue.consume_batch(10).await?;
//! let receipts: Vec<_> = batch.iter().map(|m| m.ack()).collect();
//! queue.commit(&receipts).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod store;
pub mod stream;
pub mod types;

pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::store::{AnyQueue, BackendType, ConcurrencyModel, Queue};
pub use crate::stream::StopSignal;
pub use crate::types::{ConsumerMessage, Message, QueueMetrics, Receipt};

/// Connect to a queue using just a DSN.
///
/// `postgres://` and `postgresql://` select PostgreSQL, `sqlite:` selects SQLite. The default
/// prefix is used and lease reclaim is disabled.
pub async fn connect(dsn: &str) -> Result<AnyQueue> {
    AnyQueue::connect_with_dsn(dsn).await
}

/// Connect to a queue using a full configuration.
pub async fn connect_with_config(config: &Config) -> Result<AnyQueue> {
    AnyQueue::connect(config).await
}

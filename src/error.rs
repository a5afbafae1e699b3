//! Error types and result handling for rowq.
//!
//! This module defines the core error type [`Error`] used throughout the crate, as well as the [`Result`] alias for fallible operations.
//!
//! ## What
//!
//! - [`Error`] enumerates the error cases that can occur in rowq: storage failures, transaction failures and configuration problems.
//! - [`Result<T>`] is a convenient alias for `Result<T, Error>`.
//!
//! ## How
//!
//! Every queue operation that touches storage returns [`Result<T>`]. An empty claim is
//! `Ok(vec![])`, never an error.
//!
//! ### Example
//!
//! ```rust
//! use rowq::error::{Error, Result};
//!
//! fn check_prefix(prefix: &str) -> Result<()> {
//!     if prefix.is_empty() {
//!         return Err(Error::InvalidConfig {
//!             field: "prefix".to_string(),
//!             message: "Prefix cannot be empty".to_string(),
//!         });
//!     }
//!     Ok(())
//! }
//! ```
use thiserror::Error;

/// Result type for rowq operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error type for heterogeneous error sources
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error types for rowq operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (SQLx errors)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Required configuration field is missing
    #[error("Missing required configuration: {field}")]
    MissingConfig { field: String },

    /// Configuration field has an invalid value
    #[error("Invalid configuration value for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    /// Database connection failed or was lost
    #[error("Database connection failed: {source}. Context: {context}")]
    ConnectionFailed { source: BoxError, context: String },

    /// SQL query failed
    #[error("Database query failed: {query}. Context: {context}. Source: {source}")]
    QueryFailed {
        source: BoxError,
        query: String,
        context: String,
    },

    /// Database transaction operation failed
    #[error("Database transaction failed: {source}. Context: {context}")]
    TransactionFailed { source: BoxError, context: String },

    /// Unexpected internal error occurred
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Wrap a failed `begin`/`commit` call.
    pub(crate) fn transaction(source: sqlx::Error, context: impl Into<String>) -> Self {
        Error::TransactionFailed {
            source: Box::new(source),
            context: context.into(),
        }
    }

    /// Wrap a failed statement, naming the SQL constant that was executed.
    pub(crate) fn query(
        source: sqlx::Error,
        query: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Error::QueryFailed {
            source: Box::new(source),
            query: query.into(),
            context: context.into(),
        }
    }
}

//! Core types for rowq: outbound messages, claimed messages, receipts and metrics.
//!
//! ## What
//!
//! - [`Message`] is what a producer publishes: an opaque payload with no identity.
//! - [`ConsumerMessage`] is what a claim returns: the payload plus the identity storage assigned on insert.
//! - [`Receipt`] is the consumer's verdict on a claimed message. A successful receipt deletes the row;
//!   an unsuccessful one leaves it for reclaim once its lease expires.
//! - [`QueueMetrics`] reports row counts for a queue table.
//!
//! ### Example
//!
//! ```rust
//! use rowq::types::{ConsumerMessage, Message, Receipt};
//!
//! let outbound = Message::from("hello");
//! assert_eq!(outbound.payload, b"hello".to_vec());
//!
//! let claimed = ConsumerMessage { id: 7, payload: outbound.payload };
//! let receipt = claimed.ack();
//! assert_eq!(receipt, Receipt::success(7));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tabled::Tabled;

/// A message to publish. Identity is assigned by storage on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Opaque payload bytes
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

impl From<Vec<u8>> for Message {
    fn from(payload: Vec<u8>) -> Self {
        Self { payload }
    }
}

impl From<&[u8]> for Message {
    fn from(payload: &[u8]) -> Self {
        Self::new(payload)
    }
}

impl From<&str> for Message {
    fn from(payload: &str) -> Self {
        Self::new(payload.as_bytes())
    }
}

impl From<String> for Message {
    fn from(payload: String) -> Self {
        Self::new(payload.into_bytes())
    }
}

/// A message returned by a claim, carrying its storage-assigned identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Tabled, sqlx::FromRow)]
pub struct ConsumerMessage {
    /// Row identity, unique and never reused within a queue
    pub id: i64,
    /// Opaque payload bytes
    #[tabled(display_with = "display_payload")]
    pub payload: Vec<u8>,
}

impl ConsumerMessage {
    /// Receipt marking this message as processed; committing it deletes the row.
    pub fn ack(&self) -> Receipt {
        Receipt::success(self.id)
    }

    /// Receipt marking this message as failed; the row stays for reclaim.
    pub fn nack(&self) -> Receipt {
        Receipt::failure(self.id)
    }

    /// Payload as UTF-8 text, replacing invalid sequences.
    pub fn payload_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

impl fmt::Display for ConsumerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConsumerMessage {{ id: {}, payload: {} }}",
            self.id,
            self.payload_lossy()
        )
    }
}

fn display_payload(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}

/// Consumer verdict on a claimed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: i64,
    pub success: bool,
}

impl Receipt {
    pub fn success(id: i64) -> Self {
        Self { id, success: true }
    }

    pub fn failure(id: i64) -> Self {
        Self { id, success: false }
    }
}

/// Row counts for a queue table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Tabled)]
pub struct QueueMetrics {
    /// Name of the backing table
    pub name: String,
    /// Rows currently in the table
    pub total_messages: i64,
    /// Rows a claim could take right now (never checked out, or lease expired)
    pub available_messages: i64,
    /// Rows held under an unexpired lease
    pub checked_out_messages: i64,
}

/// Ids of the receipts marked successful, in receipt order.
pub(crate) fn successful_ids(receipts: &[Receipt]) -> Vec<i64> {
    receipts
        .iter()
        .filter(|r| r.success)
        .map(|r| r.id)
        .collect()
}

//! Polling stream over a queue's batch claim.
//!
//! The loop has two states. While polling it claims batches back to back and sends each one
//! on a bounded channel; an empty or failed claim makes it sleep for the configured pause
//! before polling again. Once the [`StopSignal`] is raised the loop returns before its next
//! claim, dropping the sender so receivers see the channel close. A claim already in flight
//! is finished and delivered first.
//!
//! A full channel suspends the loop on `send`, which keeps claimed-but-undelivered work
//! bounded by the channel capacity plus one batch.

use crate::store::Queue;
use crate::types::ConsumerMessage;
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::mpsc;

/// Cooperative stop flag for a stream loop.
///
/// Writers take the exclusive lock once; the loop takes the shared lock once per iteration.
/// The flag is never reset, so a stopped handle stays stopped.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: RwLock<bool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        let mut guard = match self.stopped.write() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        };
        *guard = true;
    }

    pub fn is_stopped(&self) -> bool {
        match self.stopped.read() {
            Ok(g) => *g,
            Err(e) => *e.into_inner(),
        }
    }
}

/// Run the stream loop for `queue` until it is stopped or the receiver goes away.
pub async fn run<Q: Queue + ?Sized>(
    queue: &Q,
    size: usize,
    messages: mpsc::Sender<Vec<ConsumerMessage>>,
    pause: Duration,
) {
    tracing::info!(
        table = queue.table_name(),
        batch_size = size,
        pause_ms = pause.as_millis() as u64,
        "Stream started"
    );

    loop {
        loop {
            if queue.is_stopped() {
                tracing::info!(table = queue.table_name(), "Stream stopped");
                return;
            }

            match queue.consume_batch(size).await {
                Ok(batch) if !batch.is_empty() => {
                    let count = batch.len();
                    if messages.send(batch).await.is_err() {
                        tracing::debug!(
                            table = queue.table_name(),
                            dropped = count,
                            "Stream receiver closed, claimed messages left for reclaim"
                        );
                        return;
                    }
                }
                Ok(_) => break,
                Err(e) => {
                    tracing::warn!(table = queue.table_name(), error = %e, "Stream poll failed");
                    break;
                }
            }
        }

        tokio::time::sleep(pause).await;
    }
}

//! Relay: re-publishes every delivered message to the queue it came from.
//!
//! IMPORTANT: the relay posts to the SAME queue it consumes. Each relayed
//! message is redelivered later as a brand-new message, so a single message
//! circulates forever. That loop is how the rig keeps a queue saturated.
//!
//! ## Batch handling
//!
//! ```text
//! for each message, in delivery order:
//!     sleep(delay)            (only when delay > 0)
//!     publish(body) ── err ──► abort batch, return error
//!     log id / source / length
//! ```

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::RelayConfig;
use crate::queue::{DeliveredMessage, QueueClient, QueueError, QueueHandle};

/// Why a batch was not fully relayed.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relaying message {message_id} (#{index} in batch) failed: {source}")]
    Publish {
        index: usize,
        message_id: String,
        #[source]
        source: QueueError,
    },

    #[error("relay cancelled before message #{index}")]
    Cancelled { index: usize },
}

impl RelayError {
    /// Position in the batch of the message that was not relayed.
    pub fn index(&self) -> usize {
        match self {
            RelayError::Publish { index, .. } | RelayError::Cancelled { index } => *index,
        }
    }
}

/// What to tell the broker about one delivery once its batch is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Ack { delivery_tag: u64 },
    /// Return the delivery to the queue for redelivery
    NackRequeue { delivery_tag: u64 },
}

/// Settle a whole batch from its outcome.
///
/// Success acknowledges every delivery. Any failure sends every delivery
/// back, including the ones relayed before the failing message.
pub fn settle_batch(delivery_tags: &[u64], outcome: &Result<(), RelayError>) -> Vec<Settlement> {
    delivery_tags
        .iter()
        .map(|&delivery_tag| match outcome {
            Ok(()) => Settlement::Ack { delivery_tag },
            Err(_) => Settlement::NackRequeue { delivery_tag },
        })
        .collect()
}

/// Per-batch message echo handler.
#[derive(Clone)]
pub struct Relayer {
    client: Arc<dyn QueueClient>,
    queue: QueueHandle,
    delay: Duration,
    cancel: CancellationToken,
}

impl Relayer {
    /// Resolve the configured queue once and build a relayer for it.
    pub async fn bootstrap(
        client: Arc<dyn QueueClient>,
        config: &RelayConfig,
    ) -> Result<Self, QueueError> {
        let queue = client.resolve_queue_url(&config.queue_name).await?;

        info!(
            queue = %queue,
            delay_ms = config.delay.as_millis() as u64,
            "relay_bootstrapped"
        );

        Ok(Self::new(client, queue, config.delay))
    }

    pub fn new(client: Arc<dyn QueueClient>, queue: QueueHandle, delay: Duration) -> Self {
        Self {
            client,
            queue,
            delay,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort in-flight batches when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn queue(&self) -> &QueueHandle {
        &self.queue
    }

    /// Relay one batch, strictly in order.
    ///
    /// The first failure aborts the rest of the batch; messages after it are
    /// never attempted. Redelivery is left to whoever invoked the relay.
    pub async fn handle_batch(&self, batch: &[DeliveredMessage]) -> Result<(), RelayError> {
        for (index, message) in batch.iter().enumerate() {
            self.relay_one(index, message).await?;
        }
        Ok(())
    }

    async fn relay_one(&self, index: usize, message: &DeliveredMessage) -> Result<(), RelayError> {
        if !self.delay.is_zero() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(RelayError::Cancelled { index }),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        let published = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(RelayError::Cancelled { index }),
            result = self.client.publish(&self.queue, &message.body) => result,
        };

        published.map_err(|source| RelayError::Publish {
            index,
            message_id: message.id.clone(),
            source,
        })?;

        info!(
            message_id = %message.id,
            event_source = %message.source,
            body_length = message.body.len(),
            "relay_message_published"
        );

        Ok(())
    }
}

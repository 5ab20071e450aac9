//! Queue module: the client boundary between the rig and the queue service.
//!
//! This module provides:
//! - The [`QueueClient`] trait both components publish through
//! - An AMQP (RabbitMQ) client for real runs
//! - An in-memory client for tests
//!
//! ## Architecture
//!
//! ```text
//! Generator workers ─┐
//!                    ├─► QueueClient::publish ─► queue ─► delivery runtime ─► Relayer
//! Relayer ───────────┘                             ▲                            │
//!                                                  └────────────────────────────┘
//! ```

pub mod amqp;
pub mod memory;
pub mod types;

use async_trait::async_trait;

pub use amqp::AmqpQueueClient;
pub use memory::{InMemoryQueue, PublishAttempt};
pub use types::{DeliveredMessage, QueueError, QueueHandle};

/// Capabilities the rig needs from a queue service.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Resolve a queue name to its destination. Called once at startup.
    async fn resolve_queue_url(&self, name: &str) -> Result<QueueHandle, QueueError>;

    /// Publish one message body. Failures are returned, never retried.
    async fn publish(&self, queue: &QueueHandle, body: &str) -> Result<(), QueueError>;
}

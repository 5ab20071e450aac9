//! RabbitMQ-backed queue client.
//!
//! The client keeps one connection and channel that every worker shares, and
//! reconnects lazily if the channel has dropped. Queues live on the default
//! exchange, so a queue "URL" boils down to its routing key.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::types::{QueueError, QueueHandle};
use super::QueueClient;

/// Scheme prefix of resolved AMQP queue URLs.
pub const URL_SCHEME: &str = "amqp-queue://";

/// Async RabbitMQ queue client with connection management.
#[derive(Clone)]
pub struct AmqpQueueClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    url: String,
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
    /// Random per-process prefix for assigned message ids
    instance: u32,
    sequence: AtomicU64,
}

impl AmqpQueueClient {
    /// Create a client for the given broker URL. Connects on first use.
    pub fn new(url: String) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                url,
                connection: RwLock::new(None),
                channel: RwLock::new(None),
                instance: rand::random(),
                sequence: AtomicU64::new(0),
            }),
        }
    }

    /// Ensure we have a valid connection and channel.
    async fn ensure_connected(&self) -> Result<Channel> {
        {
            let channel = self.inner.channel.read().await;
            if let Some(ch) = channel.as_ref() {
                if ch.status().connected() {
                    return Ok(ch.clone());
                }
            }
        }

        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        // Another worker may have reconnected while we waited for the lock
        if let Some(ch) = channel.as_ref() {
            if ch.status().connected() {
                return Ok(ch.clone());
            }
        }

        info!("rabbitmq_client_connecting");

        let conn = Connection::connect(&self.inner.url, ConnectionProperties::default())
            .await
            .context("Failed to connect to RabbitMQ")?;

        let ch = conn
            .create_channel()
            .await
            .context("Failed to create channel")?;

        ch.confirm_select(ConfirmSelectOptions::default())
            .await
            .context("Failed to enable publisher confirms")?;

        info!("rabbitmq_client_connected");

        *connection = Some(conn);
        *channel = Some(ch.clone());

        Ok(ch)
    }

    fn next_message_id(&self) -> String {
        let seq = self.inner.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{:08x}-{}", self.inner.instance, seq)
    }

    /// Close the connection gracefully.
    pub async fn close(&self) {
        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        if let Some(ch) = channel.take() {
            if let Err(e) = ch.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_channel_close_error");
            }
        }

        if let Some(conn) = connection.take() {
            if let Err(e) = conn.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_connection_close_error");
            }
        }

        info!("rabbitmq_client_closed");
    }
}

/// Routing key encoded in a resolved URL.
fn routing_key(queue: &QueueHandle) -> &str {
    queue.url().strip_prefix(URL_SCHEME).unwrap_or(queue.name())
}

#[async_trait]
impl QueueClient for AmqpQueueClient {
    async fn resolve_queue_url(&self, name: &str) -> Result<QueueHandle, QueueError> {
        let channel = self
            .ensure_connected()
            .await
            .map_err(|e| QueueError::Connection(format!("{:#}", e)))?;

        // Declaring is idempotent and fails if the queue exists with other settings
        let queue = channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::Resolve {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        let handle = QueueHandle::new(name, format!("{}{}", URL_SCHEME, queue.name().as_str()));

        info!(
            queue = name,
            url = handle.url(),
            messages = queue.message_count(),
            consumers = queue.consumer_count(),
            "rabbitmq_queue_resolved"
        );

        Ok(handle)
    }

    async fn publish(&self, queue: &QueueHandle, body: &str) -> Result<(), QueueError> {
        let publish_error = |reason: String| QueueError::Publish {
            url: queue.url().to_string(),
            reason,
        };

        let channel = self
            .ensure_connected()
            .await
            .map_err(|e| publish_error(format!("{:#}", e)))?;

        let confirmation = channel
            .basic_publish(
                "",
                routing_key(queue),
                BasicPublishOptions::default(),
                body.as_bytes(),
                BasicProperties::default()
                    .with_delivery_mode(2) // Persistent
                    .with_content_type("text/plain".into())
                    .with_message_id(self.next_message_id().into()),
            )
            .await
            .map_err(|e| publish_error(e.to_string()))?
            .await
            .map_err(|e| publish_error(e.to_string()))?;

        if confirmation.is_nack() {
            return Err(publish_error("broker rejected message".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = AmqpQueueClient::new("amqp://localhost:5672".to_string());
        assert!(Arc::strong_count(&client.inner) == 1);
    }

    #[test]
    fn test_message_ids_are_unique() {
        let client = AmqpQueueClient::new("amqp://localhost:5672".to_string());
        let a = client.next_message_id();
        let b = client.next_message_id();
        assert_ne!(a, b);
        assert!(b.ends_with("-1"));
    }

    #[test]
    fn test_routing_key_from_url() {
        let handle = QueueHandle::new("load-q", format!("{}load-q", URL_SCHEME));
        assert_eq!(routing_key(&handle), "load-q");

        let foreign = QueueHandle::new("load-q", "https://q.example/load-q");
        assert_eq!(routing_key(&foreign), "load-q");
    }
}

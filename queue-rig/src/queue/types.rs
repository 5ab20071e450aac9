//! Queue-facing types shared by the generator and the relay.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// A resolved queue destination.
///
/// Resolved once per process (or relay cold start) and shared read-only;
/// cloning only bumps a reference count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueHandle {
    name: Arc<str>,
    url: Arc<str>,
}

impl QueueHandle {
    pub fn new(name: impl Into<Arc<str>>, url: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Queue name the handle was resolved from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved destination URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for QueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// One message handed to the relay by the delivery runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    /// Identifier assigned by the queue service
    pub id: String,
    /// Tag naming where the message came from
    pub source: String,
    /// Message body, relayed verbatim
    pub body: String,
}

impl DeliveredMessage {
    pub fn new(id: impl Into<String>, source: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            body: body.into(),
        }
    }

    /// Build a message from the parts of an AMQP delivery.
    ///
    /// Deliveries published without a `message_id` are identified by their
    /// delivery tag instead.
    pub fn from_amqp(message_id: Option<&str>, delivery_tag: u64, queue: &str, data: &[u8]) -> Self {
        Self {
            id: message_id
                .map(str::to_string)
                .unwrap_or_else(|| format!("delivery-{}", delivery_tag)),
            source: format!("amqp:{}", queue),
            body: String::from_utf8_lossy(data).into_owned(),
        }
    }
}

/// Failure reported by a queue client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("getting URL error for queue {name:?}: {reason}")]
    Resolve { name: String, reason: String },

    #[error("publish to {url} failed: {reason}")]
    Publish { url: String, reason: String },

    #[error("queue connection error: {0}")]
    Connection(String),
}

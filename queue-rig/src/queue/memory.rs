//! In-process queue client.
//!
//! Records every publish attempt so tests can assert exactly what the
//! generator or relay sent, and in what order. Failures are injected with a
//! predicate over the attempt index and body.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::types::{QueueError, QueueHandle};
use super::QueueClient;

type FailurePredicate = dyn Fn(usize, &str) -> bool + Send + Sync;

/// One recorded call to [`QueueClient::publish`].
#[derive(Debug, Clone)]
pub struct PublishAttempt {
    pub url: String,
    pub body: String,
    pub succeeded: bool,
    /// Tokio clock reading when the publish started
    pub at: Instant,
}

/// Deterministic queue client backed by memory.
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    urls: Mutex<HashMap<String, String>>,
    attempts: Mutex<Vec<PublishAttempt>>,
    fail_when: Mutex<Option<Box<FailurePredicate>>>,
    latency: Mutex<Option<Duration>>,
    discard_bodies: Mutex<bool>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `name` resolvable to `url`.
    pub fn with_queue(self, name: &str, url: &str) -> Self {
        lock(&self.inner.urls).insert(name.to_string(), url.to_string());
        self
    }

    /// Fail every publish for which `predicate(attempt_index, body)` holds.
    pub fn fail_when<F>(self, predicate: F) -> Self
    where
        F: Fn(usize, &str) -> bool + Send + Sync + 'static,
    {
        *lock(&self.inner.fail_when) = Some(Box::new(predicate));
        self
    }

    /// Suspend each publish for `latency`, standing in for a network round trip.
    pub fn with_latency(self, latency: Duration) -> Self {
        *lock(&self.inner.latency) = Some(latency);
        self
    }

    /// Drop message bodies from the record to bound memory in long runs.
    pub fn discard_bodies(self) -> Self {
        *lock(&self.inner.discard_bodies) = true;
        self
    }

    /// Every publish attempt so far, in call order.
    pub fn attempts(&self) -> Vec<PublishAttempt> {
        lock(&self.inner.attempts).clone()
    }

    /// Bodies of successful publishes, in call order.
    pub fn published_bodies(&self) -> Vec<String> {
        lock(&self.inner.attempts)
            .iter()
            .filter(|a| a.succeeded)
            .map(|a| a.body.clone())
            .collect()
    }

    pub fn published_count(&self) -> usize {
        lock(&self.inner.attempts).iter().filter(|a| a.succeeded).count()
    }
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    async fn resolve_queue_url(&self, name: &str) -> Result<QueueHandle, QueueError> {
        tokio::task::yield_now().await;
        match lock(&self.inner.urls).get(name) {
            Some(url) => Ok(QueueHandle::new(name, url.as_str())),
            None => Err(QueueError::Resolve {
                name: name.to_string(),
                reason: "queue does not exist".to_string(),
            }),
        }
    }

    async fn publish(&self, queue: &QueueHandle, body: &str) -> Result<(), QueueError> {
        let at = Instant::now();
        let latency = *lock(&self.inner.latency);
        match latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }

        let keep_body = !*lock(&self.inner.discard_bodies);
        let mut attempts = lock(&self.inner.attempts);
        let index = attempts.len();
        let failed = lock(&self.inner.fail_when)
            .as_ref()
            .is_some_and(|predicate| predicate(index, body));

        attempts.push(PublishAttempt {
            url: queue.url().to_string(),
            body: if keep_body { body.to_string() } else { String::new() },
            succeeded: !failed,
            at,
        });

        if failed {
            return Err(QueueError::Publish {
                url: queue.url().to_string(),
                reason: format!("injected failure on attempt {}", index),
            });
        }
        Ok(())
    }
}

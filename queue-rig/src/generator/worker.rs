//! A single publisher lane.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::counter::ThroughputCounter;
use crate::payload::random_payload;
use crate::queue::{QueueClient, QueueError, QueueHandle};

/// How a worker's loop ended.
#[derive(Debug)]
pub enum WorkerExit {
    /// The cancellation token fired.
    Stopped { published: u64 },
    /// A publish failed; the lane is dead.
    Failed { published: u64, error: QueueError },
}

/// Everything a worker reads. Shared read-only by all lanes.
#[derive(Clone)]
pub struct WorkerContext {
    pub client: Arc<dyn QueueClient>,
    pub queue: QueueHandle,
    pub counter: ThroughputCounter,
    pub min_len: usize,
    pub max_len: usize,
}

/// Generate, publish, count, repeat, until cancelled or a publish fails.
///
/// Failures are not retried; the caller decides what to log.
pub async fn run_worker(ctx: WorkerContext, cancel: CancellationToken) -> WorkerExit {
    let mut published = 0u64;

    loop {
        let body = random_payload(ctx.min_len, ctx.max_len);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return WorkerExit::Stopped { published },
            result = ctx.client.publish(&ctx.queue, &body) => result,
        };

        match result {
            Ok(()) => {
                ctx.counter.increment();
                published += 1;
            }
            Err(error) => return WorkerExit::Failed { published, error },
        }
    }
}

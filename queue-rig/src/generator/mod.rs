//! Load generator: a pool of publishers plus a throughput reporter.
//!
//! ## Flow
//!
//! ```text
//! resolve queue ─► WorkerPool (N × generate → publish → count)
//!                       │
//!                       └─► ThroughputCounter ─► Reporter (every 1s)
//! ```
//!
//! Both halves run until the cancellation token fires.

pub mod pool;
pub mod reporter;
pub mod worker;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::GeneratorConfig;
use crate::counter::ThroughputCounter;
use crate::queue::{QueueClient, QueueError};

pub use pool::{PoolSummary, WorkerPool};
pub use reporter::{RateSample, Reporter, REPORT_INTERVAL};
pub use worker::{run_worker, WorkerContext, WorkerExit};

/// Outcome of a generator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorReport {
    /// Final value of the throughput counter
    pub posted: u64,
    pub pool: PoolSummary,
}

/// Resolve the queue, then publish and report until `cancel` fires.
///
/// Only queue resolution can fail; once workers are running, their errors
/// are logged by the pool and the run carries on.
pub async fn run_generator<F>(
    client: Arc<dyn QueueClient>,
    config: &GeneratorConfig,
    cancel: CancellationToken,
    on_sample: F,
) -> Result<GeneratorReport, QueueError>
where
    F: FnMut(RateSample),
{
    let queue = client.resolve_queue_url(&config.queue_name).await?;

    info!(
        workers = config.threads,
        queue = %queue,
        min_len = config.min_len,
        max_len = config.max_len,
        "generator_starting"
    );

    let counter = ThroughputCounter::new();
    let ctx = WorkerContext {
        client,
        queue,
        counter: counter.clone(),
        min_len: config.min_len,
        max_len: config.max_len,
    };

    // Baseline before any worker can publish
    let reporter = Reporter::new(counter.clone());
    let pool = WorkerPool::start(config.threads, ctx, &cancel);

    let (summary, ()) = tokio::join!(pool.supervise(), reporter.run(cancel, on_sample));

    let report = GeneratorReport {
        posted: counter.snapshot(),
        pool: summary,
    };

    info!(posted = report.posted, "generator_stopped");

    Ok(report)
}

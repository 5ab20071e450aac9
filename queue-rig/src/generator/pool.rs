//! Worker pool: many independent publisher lanes under one cancellation token.

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::worker::{run_worker, WorkerContext, WorkerExit};

/// Tally of how every lane ended, returned once the pool has drained.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolSummary {
    /// Lanes that exited because the pool was cancelled
    pub stopped: usize,
    /// Lanes that died on a publish error
    pub failed: usize,
    /// Lanes whose task panicked
    pub panicked: usize,
    /// Messages published across all lanes
    pub published: u64,
}

/// A fixed set of concurrently running publishers.
///
/// A failing lane never affects its siblings: nothing is restarted, retried
/// or cancelled in response.
pub struct WorkerPool {
    workers: JoinSet<(usize, WorkerExit)>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Spawn `count` workers sharing `ctx`.
    ///
    /// The pool's token is a child of `parent`, so cancelling the parent also
    /// stops the pool.
    pub fn start(count: usize, ctx: WorkerContext, parent: &CancellationToken) -> Self {
        let cancel = parent.child_token();
        let mut workers = JoinSet::new();

        for index in 0..count {
            let ctx = ctx.clone();
            let cancel = cancel.clone();
            workers.spawn(async move { (index, run_worker(ctx, cancel).await) });
        }

        info!(workers = count, queue = %ctx.queue, "worker_pool_started");

        Self { workers, cancel }
    }

    /// Workers that have not exited yet.
    pub fn live_workers(&self) -> usize {
        self.workers.len()
    }

    /// Ask every worker to stop at its next suspension point.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Collect worker exits as they happen, logging each terminal error.
    ///
    /// Returns once every worker has exited, which only happens after
    /// [`shutdown`](Self::shutdown) or once every lane has failed.
    pub async fn supervise(mut self) -> PoolSummary {
        let mut summary = PoolSummary::default();

        while let Some(joined) = self.workers.join_next().await {
            match joined {
                Ok((index, WorkerExit::Stopped { published })) => {
                    summary.stopped += 1;
                    summary.published += published;
                    tracing::debug!(worker = index, published, "worker_stopped");
                }
                Ok((index, WorkerExit::Failed { published, error })) => {
                    summary.failed += 1;
                    summary.published += published;
                    error!(
                        worker = index,
                        published,
                        error = %error,
                        live_workers = self.workers.len(),
                        "worker_failed"
                    );
                }
                Err(e) => {
                    summary.panicked += 1;
                    error!(error = %e, "worker_task_aborted");
                }
            }
        }

        info!(
            stopped = summary.stopped,
            failed = summary.failed,
            panicked = summary.panicked,
            published = summary.published,
            "worker_pool_drained"
        );

        summary
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::counter::ThroughputCounter;
    use crate::queue::{InMemoryQueue, QueueHandle};

    fn context(queue: &InMemoryQueue, counter: &ThroughputCounter) -> WorkerContext {
        WorkerContext {
            client: Arc::new(queue.clone()),
            queue: QueueHandle::new("q", "mem://q"),
            counter: counter.clone(),
            min_len: 1,
            max_len: 8,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_launches_every_worker() {
        let queue = InMemoryQueue::new().with_latency(Duration::from_millis(10));
        let counter = ThroughputCounter::new();
        let root = CancellationToken::new();

        let pool = WorkerPool::start(5, context(&queue, &counter), &root);
        assert_eq!(pool.live_workers(), 5);

        tokio::time::sleep(Duration::from_millis(105)).await;
        pool.shutdown();
        let summary = pool.supervise().await;

        assert_eq!(summary.stopped, 5);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.published, counter.snapshot());
        // Five lanes at 10ms per publish for ~100ms
        assert!(counter.snapshot() >= 40, "published {}", counter.snapshot());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancel_stops_pool() {
        let queue = InMemoryQueue::new().with_latency(Duration::from_millis(1));
        let counter = ThroughputCounter::new();
        let root = CancellationToken::new();

        let pool = WorkerPool::start(3, context(&queue, &counter), &root);
        tokio::time::sleep(Duration::from_millis(20)).await;
        root.cancel();

        let summary = pool.supervise().await;
        assert_eq!(summary.stopped, 3);
    }

    #[tokio::test]
    async fn test_pool_drains_when_every_lane_fails() {
        let queue = InMemoryQueue::new().fail_when(|i, _| i >= 10);
        let counter = ThroughputCounter::new();
        let root = CancellationToken::new();

        let summary = WorkerPool::start(4, context(&queue, &counter), &root)
            .supervise()
            .await;

        assert_eq!(summary.failed, 4);
        assert_eq!(summary.published, 10);
        assert_eq!(counter.snapshot(), 10);
    }
}

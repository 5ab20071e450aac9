//! Generator runs against an in-memory queue on a paused clock.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use queueloop::{run_generator, GeneratorConfig, InMemoryQueue, QueueError, RateSample};

fn stop_after(cancel: &CancellationToken, after: Duration) {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        cancel.cancel();
    });
}

#[tokio::test(start_paused = true)]
async fn test_single_worker_runs_for_a_second() {
    let queue = InMemoryQueue::new()
        .with_queue("test-q", "https://q.example/test-q")
        .with_latency(Duration::from_millis(5));
    let config = GeneratorConfig::with_range("test-q", 1, 1_000, 1_001).unwrap();
    let cancel = CancellationToken::new();
    stop_after(&cancel, Duration::from_millis(1_100));

    let mut samples: Vec<RateSample> = Vec::new();
    let report = run_generator(Arc::new(queue.clone()), &config, cancel, |s| samples.push(s))
        .await
        .unwrap();

    assert!(report.posted >= 1);
    assert_eq!(report.posted, queue.published_count() as u64);
    assert_eq!(report.pool.stopped, 1);

    assert_eq!(samples.len(), 1);
    assert!(samples[0].posted >= 1);
    assert!(samples[0].rate <= samples[0].posted);

    for attempt in queue.attempts() {
        assert_eq!(attempt.url, "https://q.example/test-q");
        assert_eq!(attempt.body.len(), 1_000);
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_worker_does_not_stop_siblings() {
    // Exactly one publish ever fails, killing exactly one lane
    let queue = InMemoryQueue::new()
        .with_queue("test-q", "https://q.example/test-q")
        .with_latency(Duration::from_millis(10))
        .fail_when(|i, _| i == 7)
        .discard_bodies();
    let config = GeneratorConfig::with_range("test-q", 4, 10, 20).unwrap();
    let cancel = CancellationToken::new();
    stop_after(&cancel, Duration::from_millis(3_050));

    let mut samples = Vec::new();
    let report = run_generator(Arc::new(queue.clone()), &config, cancel, |s| samples.push(s))
        .await
        .unwrap();

    assert_eq!(report.pool.failed, 1);
    assert_eq!(report.pool.stopped, 3);
    assert_eq!(samples.len(), 3);
    // Three surviving lanes keep publishing every second after the failure
    assert!(samples.iter().all(|s| s.rate > 0));
    assert!(samples.windows(2).all(|w| w[1].posted >= w[0].posted));
}

#[tokio::test(start_paused = true)]
async fn test_reporter_keeps_running_when_all_lanes_fail() {
    let queue = InMemoryQueue::new()
        .with_queue("test-q", "https://q.example/test-q")
        .fail_when(|i, _| i >= 3);
    let config = GeneratorConfig::with_range("test-q", 2, 10, 20).unwrap();
    let cancel = CancellationToken::new();
    stop_after(&cancel, Duration::from_millis(2_500));

    let mut samples = Vec::new();
    let report = run_generator(Arc::new(queue.clone()), &config, cancel, |s| samples.push(s))
        .await
        .unwrap();

    assert_eq!(report.pool.failed, 2);
    assert_eq!(report.posted, 3);
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[1], RateSample { rate: 0, posted: 3 });
}

#[tokio::test]
async fn test_unresolvable_queue_is_fatal() {
    let queue = InMemoryQueue::new();
    let config = GeneratorConfig::new("missing-q", 1).unwrap();

    let err = run_generator(Arc::new(queue.clone()), &config, CancellationToken::new(), |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, QueueError::Resolve { .. }));
    assert!(queue.attempts().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_first_rate_counts_every_publish() {
    let queue = InMemoryQueue::new()
        .with_queue("test-q", "https://q.example/test-q")
        .with_latency(Duration::from_millis(1))
        .discard_bodies();
    let config = GeneratorConfig::with_range("test-q", 8, 10, 20).unwrap();
    let cancel = CancellationToken::new();
    stop_after(&cancel, Duration::from_millis(1_300));

    let mut samples: Vec<RateSample> = Vec::new();
    run_generator(Arc::new(queue), &config, cancel, |s| samples.push(s))
        .await
        .unwrap();

    // The baseline is zero, so the first sample's rate covers everything posted
    assert_eq!(samples.len(), 1);
    assert!(samples[0].posted > 0);
    assert_eq!(samples[0].rate, samples[0].posted);
}

//! Shared count of successfully published messages.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic publish counter shared by every worker and the reporter.
///
/// Cloning yields another handle to the same count.
#[derive(Debug, Clone, Default)]
pub struct ThroughputCounter {
    inner: Arc<AtomicU64>,
}

impl ThroughputCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one published message.
    pub fn increment(&self) {
        self.inner.fetch_add(1, Ordering::Relaxed);
    }

    /// Current total. Never blocks writers.
    pub fn snapshot(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_starts_at_zero() {
        assert_eq!(ThroughputCounter::new().snapshot(), 0);
    }

    #[test]
    fn test_clones_share_count() {
        let counter = ThroughputCounter::new();
        let other = counter.clone();
        other.increment();
        other.increment();
        assert_eq!(counter.snapshot(), 2);
    }

    #[test]
    fn test_no_lost_updates_across_threads() {
        let counter = ThroughputCounter::new();
        counter.increment();
        let before = counter.snapshot();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        counter.increment();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.snapshot(), before + 160_000);
    }
}

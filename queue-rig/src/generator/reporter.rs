//! Once-per-second throughput reporting.

use std::fmt;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::counter::ThroughputCounter;

/// Interval between throughput samples.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// One throughput reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSample {
    /// Messages published since the previous sample
    pub rate: u64,
    /// Messages published since startup
    pub posted: u64,
}

impl fmt::Display for RateSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rate: {}, posted: {}", self.rate, self.posted)
    }
}

/// Turns the running counter into per-interval deltas.
pub struct Reporter {
    counter: ThroughputCounter,
    previous: u64,
}

impl Reporter {
    pub fn new(counter: ThroughputCounter) -> Self {
        let previous = counter.snapshot();
        Self { counter, previous }
    }

    /// Take a sample and make it the baseline for the next one.
    pub fn tick(&mut self) -> RateSample {
        let posted = self.counter.snapshot();
        let rate = posted.saturating_sub(self.previous);
        self.previous = posted;
        RateSample { rate, posted }
    }

    /// Sample every [`REPORT_INTERVAL`] until cancelled.
    ///
    /// The first sample arrives one interval after the call.
    pub async fn run<F>(mut self, cancel: CancellationToken, mut on_sample: F)
    where
        F: FnMut(RateSample),
    {
        let mut ticker = tokio::time::interval(REPORT_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval() fires immediately; that tick is the baseline, not a sample
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let sample = self.tick();
                    tracing::debug!(rate = sample.rate, posted = sample.posted, "throughput_sample");
                    on_sample(sample);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_format() {
        let sample = RateSample { rate: 12, posted: 340 };
        assert_eq!(sample.to_string(), "rate: 12, posted: 340");
    }

    #[test]
    fn test_tick_reports_delta() {
        let counter = ThroughputCounter::new();
        counter.increment();
        let mut reporter = Reporter::new(counter.clone());

        for _ in 0..5 {
            counter.increment();
        }
        assert_eq!(reporter.tick(), RateSample { rate: 5, posted: 6 });

        assert_eq!(reporter.tick(), RateSample { rate: 0, posted: 6 });

        counter.increment();
        assert_eq!(reporter.tick(), RateSample { rate: 1, posted: 7 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_samples_once_per_interval() {
        let counter = ThroughputCounter::new();
        let cancel = CancellationToken::new();
        let mut samples = Vec::new();

        let stopper = {
            let cancel = cancel.clone();
            let counter = counter.clone();
            async move {
                counter.increment();
                tokio::time::sleep(Duration::from_millis(3_500)).await;
                cancel.cancel();
            }
        };

        tokio::join!(
            Reporter::new(counter.clone()).run(cancel.clone(), |s| samples.push(s)),
            stopper
        );

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0], RateSample { rate: 1, posted: 1 });
        assert_eq!(samples[1].rate, 0);
        assert!(samples.iter().all(|s| s.posted == 1));
    }
}

//! Rolling performance history per provider
//!
//! Keeps a window of latency/success samples derived from each provider's
//! aggregate metrics snapshots. Consumed by the performance strategy's
//! estimation only, never by breaker logic.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// A single latency/success observation
#[derive(Debug, Clone, Copy)]
pub struct PerformanceSample {
    pub timestamp: Instant,
    pub response_time: Duration,
    pub success: bool,
}

/// Rolling buffer of [`PerformanceSample`]s for one provider
///
/// Samples older than the window are discarded on every append, so the
/// buffer never grows beyond what the window and event rate produce.
#[derive(Debug)]
pub struct PerformanceHistory {
    samples: VecDeque<PerformanceSample>,
    window: Duration,
}

impl PerformanceHistory {
    /// Create an empty history with the given rolling window
    pub fn new(window: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window,
        }
    }

    /// Append a sample and prune everything older than the window
    pub fn record(&mut self, sample: PerformanceSample) {
        self.samples.push_back(sample);
        let cutoff = sample.timestamp.checked_sub(self.window);
        if let Some(cutoff) = cutoff {
            while let Some(front) = self.samples.front() {
                if front.timestamp < cutoff {
                    self.samples.pop_front();
                } else {
                    break;
                }
            }
        }
    }

    /// Most recently observed response time, if any sample is in the window
    pub fn last_response_time(&self) -> Option<Duration> {
        self.samples.back().map(|s| s.response_time)
    }

    /// Fraction of windowed samples that were successful, 1.0 when empty
    pub fn success_rate(&self) -> f64 {
        if self.samples.is_empty() {
            return 1.0;
        }
        let successes = self.samples.iter().filter(|s| s.success).count();
        successes as f64 / self.samples.len() as f64
    }

    /// Number of samples currently in the window
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when no samples are in the window
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

//! Adaptive retransmission timeout from smoothed round-trip samples.

use std::time::Duration;

const ALPHA: f64 = 0.875;
const BETA: f64 = 0.75;

/// Floor applied when the timeout is turned into a timer deadline.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Smoothed round-trip estimator.
///
/// Keeps an EWMA estimate and deviation in nanoseconds and derives the
/// retransmission timeout from them. A sample marked `restart` (the first
/// one ever, or one whose acknowledging unit carried sequence zero) resets
/// the estimator to twice the sample.
#[derive(Debug, Clone, Default)]
pub struct RttEstimator {
    estimate_ns: f64,
    deviation_ns: f64,
    timeout_ns: f64,
    primed: bool,
}

impl RttEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one round-trip sample in nanoseconds.
    pub fn sample(&mut self, sample_ns: i64, restart: bool) {
        let s = sample_ns.max(0) as f64;
        if restart || !self.primed {
            self.estimate_ns = s;
            self.deviation_ns = 0.0;
            self.timeout_ns = 2.0 * s;
            self.primed = true;
        } else {
            let delta = (s - self.estimate_ns).abs();
            self.estimate_ns = ALPHA * self.estimate_ns + (1.0 - ALPHA) * s;
            self.deviation_ns = BETA * self.deviation_ns + (1.0 - BETA) * delta;
            self.timeout_ns = self.estimate_ns + 4.0 * self.deviation_ns;
        }
    }

    /// Current retransmission timeout, floored for the scheduler.
    pub fn timeout(&self) -> Duration {
        Duration::from_nanos(self.timeout_ns as u64).max(MIN_TIMEOUT)
    }
}

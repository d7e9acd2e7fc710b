//! Exponential backoff with symmetric jitter
//!
//! The executor client sleeps `min(max_delay, base_delay * 2^attempt)`
//! between attempts, stretched or shrunk by a uniformly sampled jitter
//! factor so concurrent sessions do not hammer a recovering executor in
//! lockstep.

use rand::Rng;
use std::time::Duration;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Cap applied to the exponential delay before jitter
    pub max_delay: Duration,
    /// Symmetric jitter amplitude as a percentage of the capped delay
    pub jitter_percent: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter_percent: 10.0,
        }
    }
}

impl RetryConfig {
    /// Backoff delay after the given zero-based attempt, jitter applied
    pub fn backoff_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let exponent = attempt.min(63);
        let exponential = self.base_delay.as_secs_f64() * 2f64.powi(exponent as i32);
        let capped = exponential.min(self.max_delay.as_secs_f64());

        let jitter = self.jitter_percent / 100.0;
        let factor = if jitter > 0.0 {
            rng.gen_range((1.0 - jitter)..=(1.0 + jitter))
        } else {
            1.0
        };

        Duration::from_secs_f64((capped * factor).max(0.0))
    }

    /// Worst-case total sleep across a full retry budget: every backoff at
    /// the capped delay with maximum positive jitter
    pub fn max_total_backoff(&self) -> Duration {
        let jitter = 1.0 + self.jitter_percent / 100.0;
        let mut total = 0.0;
        for attempt in 0..self.max_attempts.saturating_sub(1) {
            let exponential = self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(63) as i32);
            total += exponential.min(self.max_delay.as_secs_f64()) * jitter;
        }
        Duration::from_secs_f64(total)
    }
}

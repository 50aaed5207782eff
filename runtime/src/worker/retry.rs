//! Exponential backoff with jitter for failed capture jobs.

use crate::config::WorkerConfig;
use rand::Rng;

/// Retry schedule for capture jobs.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    max_attempts: u32,
}

impl Backoff {
    pub fn new(base_ms: u64, max_ms: u64, max_attempts: u32) -> Self {
        Self {
            base_ms,
            max_ms: max_ms.max(base_ms),
            max_attempts,
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.retry_base_ms, config.retry_max_ms, config.max_attempts)
    }

    /// Whether a job that has made `attempts` attempts may run again.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before the attempt following attempt number `attempt` (1-based):
    /// `base * 2^(attempt-1)`, capped, then scaled by a 50%–150% jitter and
    /// capped again.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(32);
        let exponential = self.base_ms.saturating_mul(1u64 << exponent);
        let capped = exponential.min(self.max_ms);
        let jitter: f64 = rand::thread_rng().gen_range(0.5..1.5);
        ((capped as f64 * jitter) as u64).min(self.max_ms)
    }
}

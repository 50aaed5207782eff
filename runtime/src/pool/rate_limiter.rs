//! Pacing for marketplace navigations.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Limits concurrent navigations and enforces a minimum gap between two
/// navigation starts.
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    min_delay: Duration,
    last_request: tokio::sync::Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// - `max_concurrent`: navigations in flight at once
    /// - `min_delay_ms`: minimum milliseconds between navigation starts
    pub fn new(max_concurrent: usize, min_delay_ms: u64) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            min_delay: Duration::from_millis(min_delay_ms),
            last_request: tokio::sync::Mutex::new(None),
        }
    }

    pub fn from_worker_config(config: &crate::config::WorkerConfig) -> Self {
        Self::new(config.concurrency, config.min_delay_ms)
    }

    /// Wait for a slot and for the minimum delay to pass.
    pub async fn acquire(&self) -> Result<RateLimitGuard> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| anyhow!("rate limiter closed: {e}"))?;

        {
            let mut last = self.last_request.lock().await;
            if let Some(previous) = *last {
                let elapsed = previous.elapsed();
                if elapsed < self.min_delay {
                    tokio::time::sleep(self.min_delay - elapsed).await;
                }
            }
            *last = Some(Instant::now());
        }

        Ok(RateLimitGuard { _permit: permit })
    }
}

/// Releases the slot when dropped.
pub struct RateLimitGuard {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

//! Context pool and navigation pacing.

pub mod manager;
pub mod rate_limiter;

pub use manager::{ContextHandle, PoolManager};
pub use rate_limiter::RateLimiter;

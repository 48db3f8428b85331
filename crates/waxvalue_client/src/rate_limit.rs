//! Rate limiter for the backend API.
//!
//! The backend proxies Discogs, which allows 60 authenticated requests
//! per minute; stay comfortably under that and throttle writes harder.

use governor::{Quota, RateLimiter as GovLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Dual rate limiter - separate buckets for reads and writes.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    read_limiter: Arc<GovLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>>,
    write_limiter: Arc<GovLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>>,
}

impl RateLimiter {
    /// Create with limits sized for the Discogs proxy.
    pub fn new() -> Self {
        Self::with_limits(5, 2)
    }

    /// Create with custom per-second limits. A zero limit is clamped to 1.
    pub fn with_limits(reads_per_sec: u32, writes_per_sec: u32) -> Self {
        let read_quota = Quota::per_second(NonZeroU32::new(reads_per_sec).unwrap_or(NonZeroU32::MIN));
        let write_quota = Quota::per_second(NonZeroU32::new(writes_per_sec).unwrap_or(NonZeroU32::MIN));

        Self {
            read_limiter: Arc::new(GovLimiter::direct(read_quota)),
            write_limiter: Arc::new(GovLimiter::direct(write_quota)),
        }
    }

    /// Wait until a read slot is available.
    pub async fn wait_read(&self) {
        self.read_limiter.until_ready().await;
    }

    /// Wait until a write slot is available.
    pub async fn wait_write(&self) {
        self.write_limiter.until_ready().await;
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

//! Shared file-move throttle
//!
//! A single governor limiter consulted by every processing worker before each
//! file move. Burst is pinned to one cell so moves are spaced evenly and no
//! one-second window sees more than the configured rate.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;

pub struct MoveRateLimiter {
    limiter: Option<DefaultDirectRateLimiter>,
    per_second: u32,
}

impl MoveRateLimiter {
    /// `per_second == 0` disables throttling
    pub fn new(per_second: u32) -> Self {
        let limiter = NonZeroU32::new(per_second).map(|rate| {
            let quota = Quota::per_second(rate).allow_burst(NonZeroU32::MIN);
            RateLimiter::direct(quota)
        });

        Self { limiter, per_second }
    }

    /// Wait until one more move is allowed
    pub async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    pub fn per_second(&self) -> u32 {
        self.per_second
    }
}

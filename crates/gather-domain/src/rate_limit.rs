//! Sliding-window rate-limit policy.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Requests allowed inside one window.
    pub limit: u32,
    pub window_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Unix milliseconds at which the oldest counted request leaves the window.
    pub reset_at_ms: u64,
}

impl RateLimitPolicy {
    pub fn new(limit: u32, window_secs: u64) -> Self {
        Self {
            limit,
            window_ms: window_secs.saturating_mul(1_000),
        }
    }

    /// Decide from the number of requests in the window (including the current one)
    /// and the timestamp of the oldest of them.
    pub fn decide(&self, count: u64, oldest_ms: Option<u64>, now_ms: u64) -> RateLimitDecision {
        let allowed = count <= u64::from(self.limit);
        let remaining = u64::from(self.limit).saturating_sub(count) as u32;
        let reset_at_ms = oldest_ms.unwrap_or(now_ms).saturating_add(self.window_ms);
        RateLimitDecision {
            allowed,
            remaining,
            reset_at_ms,
        }
    }

    /// Start of the window ending at `now_ms`.
    pub fn window_start(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.window_ms)
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new(10, 60)
    }
}

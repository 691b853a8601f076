use anyhow::Context as _;
use chrono::Utc;
use deadpool_redis::Pool;
use deadpool_redis::redis;
use uuid::Uuid;

use gather_domain::rate_limit::{RateLimitDecision, RateLimitPolicy};

use crate::domain::repository::RateLimiter;
use crate::error::TicketingError;

/// Sliding-window limiter over a Redis sorted set of request timestamps.
#[derive(Clone)]
pub struct RedisRateLimiter {
    pub pool: Pool,
    pub policy: RateLimitPolicy,
}

fn checkout_key(identifier: &str) -> String {
    format!("rate_limit:checkout:{identifier}")
}

impl RateLimiter for RedisRateLimiter {
    async fn check(&self, identifier: &str) -> Result<RateLimitDecision, TicketingError> {
        let mut conn = self.pool.get().await.context("get redis connection")?;
        let now_ms = Utc::now().timestamp_millis().max(0) as u64;
        let key = checkout_key(identifier);
        let member = format!("{now_ms}-{}", Uuid::new_v4());

        let (count, oldest): (u64, Vec<(String, f64)>) = redis::pipe()
            .atomic()
            .zrembyscore(&key, 0, self.policy.window_start(now_ms))
            .ignore()
            .zadd(&key, &member, now_ms)
            .ignore()
            .zcard(&key)
            .zrange_withscores(&key, 0, 0)
            .pexpire(&key, self.policy.window_ms as i64)
            .ignore()
            .query_async(&mut conn)
            .await
            .context("rate limit pipeline")?;

        let oldest_ms = oldest.first().map(|(_, score)| *score as u64);
        Ok(self.policy.decide(count, oldest_ms, now_ms))
    }
}

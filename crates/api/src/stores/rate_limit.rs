//! Sliding-window rate limiting.
//!
//! Counters are sorted sets keyed by `(bucket, subject)`: one member per
//! request, scored by millisecond timestamp. Each check prunes entries
//! older than the window and counts what remains, so the window slides at
//! per-request resolution and burst-then-idle is never rewarded.
//!
//! The Redis implementation is authoritative across instances; when Redis
//! is unreachable the `FallbackRateLimiter` degrades to process-local
//! counters with a warning rather than failing open.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Under the limit, includes current count.
    Allowed(i64),
    /// Over the limit; `retry_after_secs` says when capacity frees up.
    Exceeded { count: i64, retry_after_secs: u64 },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed(_))
    }
}

/// Rate limiter trait for checking and recording requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Record one request against `key` and report whether it fits inside
    /// the sliding window.
    async fn check(&self, key: &str, limit: i64, window_secs: u64) -> Result<RateLimitResult>;
}

/// Redis implementation of RateLimiter.
#[derive(Clone)]
pub struct RedisRateLimiter {
    client: redis::Client,
}

impl RedisRateLimiter {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, key: &str, limit: i64, window_secs: u64) -> Result<RateLimitResult> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let now_ms = Utc::now().timestamp_millis();
        let window_ms = window_secs as i64 * 1000;
        let window_start = now_ms - window_ms;

        let (_pruned, count): (i64, i64) = redis::pipe()
            .cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg(0)
            .arg(window_start)
            .cmd("ZCARD")
            .arg(key)
            .query_async(&mut conn)
            .await?;

        if count >= limit {
            // The oldest surviving entry decides when a slot frees up.
            let oldest: Vec<(String, i64)> = redis::cmd("ZRANGE")
                .arg(key)
                .arg(0)
                .arg(0)
                .arg("WITHSCORES")
                .query_async(&mut conn)
                .await?;
            let retry_after_ms = oldest
                .first()
                .map(|(_, score)| (score + window_ms - now_ms).max(0))
                .unwrap_or(window_ms);
            return Ok(RateLimitResult::Exceeded {
                count,
                retry_after_secs: ((retry_after_ms as u64) / 1000).max(1),
            });
        }

        let member = format!("{}-{:08x}", now_ms, rand::random::<u32>());
        let _: (i64, i64) = redis::pipe()
            .cmd("ZADD")
            .arg(key)
            .arg(now_ms)
            .arg(&member)
            .cmd("EXPIRE")
            .arg(key)
            .arg(window_secs)
            .query_async(&mut conn)
            .await?;

        Ok(RateLimitResult::Allowed(count + 1))
    }
}

/// Process-local rate limiter with the same sliding-window semantics.
///
/// Used directly in single-instance development and as the degraded path
/// when the shared store is down.
#[derive(Default)]
pub struct LocalRateLimiter {
    windows: Mutex<HashMap<String, VecDeque<i64>>>,
}

impl LocalRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_at(&self, key: &str, limit: i64, window_secs: u64, now_ms: i64) -> RateLimitResult {
        let window_ms = window_secs as i64 * 1000;
        let window_start = now_ms - window_ms;

        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        let entries = windows.entry(key.to_string()).or_default();

        while entries.front().is_some_and(|&t| t <= window_start) {
            entries.pop_front();
        }

        let count = entries.len() as i64;
        if count >= limit {
            let retry_after_ms = entries
                .front()
                .map(|&t| (t + window_ms - now_ms).max(0))
                .unwrap_or(window_ms);
            return RateLimitResult::Exceeded {
                count,
                retry_after_secs: ((retry_after_ms as u64) / 1000).max(1),
            };
        }

        entries.push_back(now_ms);
        RateLimitResult::Allowed(count + 1)
    }
}

#[async_trait]
impl RateLimiter for LocalRateLimiter {
    async fn check(&self, key: &str, limit: i64, window_secs: u64) -> Result<RateLimitResult> {
        Ok(self.check_at(key, limit, window_secs, Utc::now().timestamp_millis()))
    }
}

/// Redis-first limiter that degrades to local counters when the shared
/// store is unreachable. The degradation is logged; it is never silent.
pub struct FallbackRateLimiter {
    shared: RedisRateLimiter,
    local: LocalRateLimiter,
}

impl FallbackRateLimiter {
    pub fn new(client: redis::Client) -> Self {
        Self {
            shared: RedisRateLimiter::new(client),
            local: LocalRateLimiter::new(),
        }
    }
}

#[async_trait]
impl RateLimiter for FallbackRateLimiter {
    async fn check(&self, key: &str, limit: i64, window_secs: u64) -> Result<RateLimitResult> {
        match self.shared.check(key, limit, window_secs).await {
            Ok(result) => Ok(result),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "rate-limit store unreachable, using local counters"
                );
                self.local.check(key, limit, window_secs).await
            }
        }
    }
}

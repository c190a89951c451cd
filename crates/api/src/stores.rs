//! Ephemeral stores (Redis).
//!
//! This module contains traits and implementations for ephemeral data
//! storage. All data stored here has automatic TTL- or window-based
//! expiration.
//!
//! ## Stores
//!
//! - **sessions** - session-token to user bindings (TTL)
//! - **rate_limit** - sliding-window counters per (bucket, subject)
//!
//! ## Redis Key Patterns
//!
//! ```text
//! session:{token}                      → Session JSON (auto-expires)
//! ratelimit:{bucket}:user:{user_id}    → sorted set of request timestamps
//! ratelimit:{bucket}:anon:{ip_hash}    → sorted set of request timestamps
//! ratelimit:{bucket}:ip:{ip_hash}      → sorted set of request timestamps
//! ```
//!
//! ## Usage in Handlers
//!
//! Stores are accessed via `state.stores`:
//!
//! ```ignore
//! async fn handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
//!     let session = state.stores.sessions.get(&token).await?;
//!     let verdict = state.stores.rate_limiter.check(&key, 10, 60).await?;
//! }
//! ```

mod rate_limit;
mod sessions;

pub use rate_limit::{
    FallbackRateLimiter, LocalRateLimiter, RateLimitResult, RateLimiter, RedisRateLimiter,
};
pub use sessions::{RedisSessionStore, SessionStore};

#[cfg(test)]
pub use rate_limit::MockRateLimiter;
#[cfg(test)]
pub use sessions::MockSessionStore;

use std::sync::Arc;

/// Collection of all ephemeral stores.
#[derive(Clone)]
pub struct Stores {
    pub sessions: Arc<dyn SessionStore>,
    pub rate_limiter: Arc<dyn RateLimiter>,
}

//! Admission controller: tiered sliding-window rate limits.
//!
//! Four buckets (upload, download, api, auth), each with three limits:
//! anonymous per-IP, authenticated per-user, and an unconditional per-IP
//! ceiling that applies even to authenticated traffic so a compromised
//! account cannot hammer the service from one address. The lower of the
//! applicable limits wins.
//!
//! Handlers call [`check`] before touching the repository or the gateway.

use crate::{
    config::Config,
    error::AppError,
    middleware::auth::Principal,
    state::AppState,
    stores::RateLimitResult,
};

/// Rate-limit bucket, one per traffic class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateBucket {
    Upload,
    Download,
    Api,
    Auth,
}

impl RateBucket {
    pub fn as_str(self) -> &'static str {
        match self {
            RateBucket::Upload => "upload",
            RateBucket::Download => "download",
            RateBucket::Api => "api",
            RateBucket::Auth => "auth",
        }
    }
}

/// Limits for one bucket within the configured window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketLimits {
    pub anon: i64,
    pub user: i64,
    pub ip: i64,
}

pub fn limits_for(config: &Config, bucket: RateBucket) -> BucketLimits {
    match bucket {
        RateBucket::Upload => BucketLimits {
            anon: config.upload_anon_limit,
            user: config.upload_user_limit,
            ip: config.upload_ip_limit,
        },
        RateBucket::Download => BucketLimits {
            anon: config.download_anon_limit,
            user: config.download_user_limit,
            ip: config.download_ip_limit,
        },
        RateBucket::Api => BucketLimits {
            anon: config.api_anon_limit,
            user: config.api_user_limit,
            ip: config.api_ip_limit,
        },
        RateBucket::Auth => BucketLimits {
            anon: config.auth_anon_limit,
            user: config.auth_user_limit,
            ip: config.auth_ip_limit,
        },
    }
}

/// Enforce the bucket's limits for this caller. Returns `rate_limited`
/// with a Retry-After advisory when any applicable limit is exhausted.
pub async fn check(
    state: &AppState,
    bucket: RateBucket,
    principal: &Principal,
    ip_hash: &str,
) -> Result<(), AppError> {
    let limits = limits_for(&state.config, bucket);
    let window = state.config.rate_window_secs;

    let (subject_key, subject_limit) = match principal {
        Principal::User(id) => (
            format!("ratelimit:{}:user:{}", bucket.as_str(), id),
            limits.user,
        ),
        Principal::Anonymous => (
            format!("ratelimit:{}:anon:{}", bucket.as_str(), ip_hash),
            limits.anon,
        ),
    };
    let subject = state
        .stores
        .rate_limiter
        .check(&subject_key, subject_limit, window)
        .await?;

    // IP ceiling is unconditional, authenticated or not.
    let ip_key = format!("ratelimit:{}:ip:{}", bucket.as_str(), ip_hash);
    let ceiling = state
        .stores
        .rate_limiter
        .check(&ip_key, limits.ip, window)
        .await?;

    let mut retry_after_secs = 0u64;
    for verdict in [subject, ceiling] {
        if let RateLimitResult::Exceeded {
            retry_after_secs: retry,
            ..
        } = verdict
        {
            retry_after_secs = retry_after_secs.max(retry);
        }
    }

    if retry_after_secs > 0 {
        state.metrics.rate_limited.inc();
        tracing::debug!(bucket = bucket.as_str(), "request rate limited");
        return Err(AppError::RateLimited { retry_after_secs });
    }

    Ok(())
}

//! Shared test utilities for API handler tests.
//!
//! Provides common mock factories and a flexible `TestStateBuilder` for
//! constructing `AppState` instances with only the mocks needed for each
//! test.
//!
//! ## Usage
//!
//! ```ignore
//! use crate::test_utils::{TestStateBuilder, mock_share};
//!
//! let mut share_repo = MockShareRepo::new();
//! share_repo.expect_find_by_id().returning(|_| Ok(Some(mock_share("s1", ShareState::Available))));
//!
//! let state = TestStateBuilder::new()
//!     .with_share_repo(share_repo)
//!     .build();
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::config::Config;
use crate::metrics::Metrics;
use crate::models::{Share, ShareState, User};
use crate::repos::{
    MockDownloadRepo, MockShareRepo, MockUserRepo, NewShare, Repos,
};
use crate::services::MockObjectStore;
use crate::signaling::{Hub, HubConfig};
use crate::state::AppState;
use crate::stores::{MockRateLimiter, MockSessionStore, Stores};

/// Creates a test configuration with dummy values.
pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 3000,
        database_url: "postgres://test".to_string(),
        redis_url: "redis://test".to_string(),
        s3_endpoint: "http://127.0.0.1:9000".to_string(),
        s3_region: "us-east-1".to_string(),
        s3_bucket: "filebeam-test".to_string(),
        s3_access_key: "test".to_string(),
        s3_secret_key: "test".to_string(),
        max_size_bytes: 100 * 1024 * 1024,
        allowed_expiry_hours: vec![2, 5, 24],
        mime_blocklist: vec![],
        storage_quota_bytes: 1024 * 1024 * 1024,
        max_pending_uploads: 10,
        anonymous_shares: false,
        upload_url_ttl_secs: 900,
        download_url_ttl_secs: 300,
        sweep_interval_secs: 300,
        sweep_grace_secs: 30,
        sweep_batch: 100,
        sweep_backoff_base_secs: 60,
        sweep_deadline_secs: 30,
        retention_days: 7,
        download_event_retention_days: 90,
        rate_window_secs: 60,
        upload_anon_limit: 5,
        upload_user_limit: 20,
        upload_ip_limit: 60,
        download_anon_limit: 30,
        download_user_limit: 120,
        download_ip_limit: 300,
        api_anon_limit: 60,
        api_user_limit: 240,
        api_ip_limit: 600,
        auth_anon_limit: 5,
        auth_user_limit: 10,
        auth_ip_limit: 20,
        session_cookie: "fb_session".to_string(),
        session_ttl_secs: 7 * 24 * 60 * 60,
        ip_hash_salt: "test-salt".to_string(),
        room_cap: 16,
        max_rooms: 4096,
        send_queue_depth: 32,
        ws_max_frame_bytes: 64 * 1024,
        heartbeat_secs: 15,
        idle_timeout_secs: 60,
        room_id_max_len: 64,
        p2p_allow_anonymous: true,
        env: "test".to_string(),
    }
}

/// Creates a mock user with the given email.
pub fn mock_user(email: &str) -> User {
    User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        display_name: email.split('@').next().unwrap_or("user").to_string(),
        created_at: Utc::now(),
    }
}

/// Creates a mock share in the given state: a 1 MiB PDF with a 2 hour
/// lifetime remaining.
pub fn mock_share(id: &str, state: ShareState) -> Share {
    let now = Utc::now();
    Share {
        id: id.to_string(),
        owner_user_id: Some(Uuid::new_v4()),
        storage_key: format!("{id}/report.pdf"),
        original_name: "report.pdf".to_string(),
        size_bytes: 1_048_576,
        mime_type: "application/pdf".to_string(),
        password_hash: None,
        created_at: now,
        expires_at: now + Duration::hours(2),
        download_count: 0,
        state,
        sweep_attempts: 0,
        next_sweep_at: None,
        deleted_at: None,
    }
}

/// Builds the Share a `create_pending` insert would return.
pub fn mock_pending_share(new_share: &NewShare) -> Share {
    Share {
        id: new_share.id.clone(),
        owner_user_id: new_share.owner_user_id,
        storage_key: new_share.storage_key.clone(),
        original_name: new_share.original_name.clone(),
        size_bytes: new_share.size_bytes,
        mime_type: new_share.mime_type.clone(),
        password_hash: new_share.password_hash.clone(),
        created_at: Utc::now(),
        expires_at: new_share.expires_at,
        download_count: 0,
        state: ShareState::PendingUpload,
        sweep_attempts: 0,
        next_sweep_at: None,
        deleted_at: None,
    }
}

/// Builder for test `AppState` instances. Mocks default to empty (any
/// unexpected call panics), so each test wires exactly what it needs.
pub struct TestStateBuilder {
    config: Config,
    user_repo: MockUserRepo,
    share_repo: MockShareRepo,
    download_repo: MockDownloadRepo,
    session_store: MockSessionStore,
    rate_limiter: MockRateLimiter,
    object_store: MockObjectStore,
}

impl TestStateBuilder {
    pub fn new() -> Self {
        Self {
            config: test_config(),
            user_repo: MockUserRepo::new(),
            share_repo: MockShareRepo::new(),
            download_repo: MockDownloadRepo::new(),
            session_store: MockSessionStore::new(),
            rate_limiter: MockRateLimiter::new(),
            object_store: MockObjectStore::new(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_user_repo(mut self, repo: MockUserRepo) -> Self {
        self.user_repo = repo;
        self
    }

    pub fn with_share_repo(mut self, repo: MockShareRepo) -> Self {
        self.share_repo = repo;
        self
    }

    pub fn with_download_repo(mut self, repo: MockDownloadRepo) -> Self {
        self.download_repo = repo;
        self
    }

    pub fn with_session_store(mut self, store: MockSessionStore) -> Self {
        self.session_store = store;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: MockRateLimiter) -> Self {
        self.rate_limiter = limiter;
        self
    }

    pub fn with_object_store(mut self, store: MockObjectStore) -> Self {
        self.object_store = store;
        self
    }

    pub fn build(self) -> AppState {
        let database = PgPoolOptions::new()
            .connect_lazy(&self.config.database_url)
            .expect("lazy test pool");
        let redis = redis::Client::open(self.config.redis_url.as_str()).expect("test redis client");
        let hub = Arc::new(Hub::new(HubConfig::from_config(&self.config)));
        let metrics = Arc::new(Metrics::new().expect("test metrics"));

        AppState {
            config: Arc::new(self.config),
            database,
            redis,
            repos: Repos {
                users: Arc::new(self.user_repo),
                shares: Arc::new(self.share_repo),
                downloads: Arc::new(self.download_repo),
            },
            stores: Stores {
                sessions: Arc::new(self.session_store),
                rate_limiter: Arc::new(self.rate_limiter),
            },
            storage: Arc::new(self.object_store),
            hub,
            metrics,
        }
    }
}

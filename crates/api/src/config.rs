use serde::{Deserialize, Serialize};

/// Server configuration, loaded once at startup from `FILEBEAM_`-prefixed
/// environment variables and injected as a single immutable struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub redis_url: String,

    // S3-compatible object store (MinIO, R2, AWS).
    pub s3_endpoint: String,
    #[serde(default = "default_s3_region")]
    pub s3_region: String,
    pub s3_bucket: String,
    pub s3_access_key: String,
    pub s3_secret_key: String,

    // Upload policy.
    /// Hard cap on object size. Exactly this many bytes is accepted.
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: i64,
    /// Allowed share lifetimes, e.g. "2,5,24".
    #[serde(default = "default_allowed_expiry_hours")]
    pub allowed_expiry_hours: Vec<i64>,
    /// MIME prefixes that are refused outright (e.g. "application/x-msdownload").
    #[serde(default)]
    pub mime_blocklist: Vec<String>,
    #[serde(default = "default_storage_quota_bytes")]
    pub storage_quota_bytes: i64,
    /// Max shares a user may hold in `pending_upload` at once.
    #[serde(default = "default_max_pending_uploads")]
    pub max_pending_uploads: i64,
    /// Whether shares may be created without an authenticated session.
    #[serde(default)]
    pub anonymous_shares: bool,

    // Presigned URL windows.
    #[serde(default = "default_upload_url_ttl_secs")]
    pub upload_url_ttl_secs: u64,
    #[serde(default = "default_download_url_ttl_secs")]
    pub download_url_ttl_secs: u64,

    // Sweeper.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Clock-skew absorption: shares are only swept once they are this far
    /// past expiry. Request-time expiry checks do NOT apply the grace.
    #[serde(default = "default_sweep_grace_secs")]
    pub sweep_grace_secs: i64,
    #[serde(default = "default_sweep_batch")]
    pub sweep_batch: i64,
    #[serde(default = "default_sweep_backoff_base_secs")]
    pub sweep_backoff_base_secs: i64,
    /// Soft deadline per sweep pass; partial progress is committed.
    #[serde(default = "default_sweep_deadline_secs")]
    pub sweep_deadline_secs: u64,
    /// How long soft-deleted rows are retained before hard deletion. Zero
    /// purges them on the next sweep.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_download_event_retention_days")]
    pub download_event_retention_days: i64,

    // Admission: sliding-window rate limits. The window applies to every
    // bucket; limits are counted per subject within the window.
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,
    #[serde(default = "default_upload_anon_limit")]
    pub upload_anon_limit: i64,
    #[serde(default = "default_upload_user_limit")]
    pub upload_user_limit: i64,
    #[serde(default = "default_upload_ip_limit")]
    pub upload_ip_limit: i64,
    #[serde(default = "default_download_anon_limit")]
    pub download_anon_limit: i64,
    #[serde(default = "default_download_user_limit")]
    pub download_user_limit: i64,
    #[serde(default = "default_download_ip_limit")]
    pub download_ip_limit: i64,
    #[serde(default = "default_api_anon_limit")]
    pub api_anon_limit: i64,
    #[serde(default = "default_api_user_limit")]
    pub api_user_limit: i64,
    #[serde(default = "default_api_ip_limit")]
    pub api_ip_limit: i64,
    #[serde(default = "default_auth_anon_limit")]
    pub auth_anon_limit: i64,
    #[serde(default = "default_auth_user_limit")]
    pub auth_user_limit: i64,
    #[serde(default = "default_auth_ip_limit")]
    pub auth_ip_limit: i64,

    // Sessions.
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Salt mixed into hashed client IPs (rate-limit subjects, download
    /// events). Raw IPs are never persisted.
    #[serde(default)]
    pub ip_hash_salt: String,

    // Signaling hub.
    #[serde(default = "default_room_cap")]
    pub room_cap: usize,
    #[serde(default = "default_max_rooms")]
    pub max_rooms: usize,
    #[serde(default = "default_send_queue_depth")]
    pub send_queue_depth: usize,
    #[serde(default = "default_ws_max_frame_bytes")]
    pub ws_max_frame_bytes: usize,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: i64,
    #[serde(default = "default_room_id_max_len")]
    pub room_id_max_len: usize,
    /// Whether peers may join rooms without an authenticated session.
    #[serde(default = "default_true")]
    pub p2p_allow_anonymous: bool,

    /// Set to "production" for JSON logging, anything else for human-readable.
    #[serde(default)]
    pub env: String,
}

impl Config {
    pub fn is_production(&self) -> bool {
        self.env == "production"
    }
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_max_size_bytes() -> i64 {
    100 * 1024 * 1024
}

fn default_allowed_expiry_hours() -> Vec<i64> {
    vec![2, 5, 24]
}

fn default_storage_quota_bytes() -> i64 {
    1024 * 1024 * 1024
}

fn default_max_pending_uploads() -> i64 {
    10
}

fn default_upload_url_ttl_secs() -> u64 {
    900
}

fn default_download_url_ttl_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_sweep_grace_secs() -> i64 {
    30
}

fn default_sweep_batch() -> i64 {
    100
}

fn default_sweep_backoff_base_secs() -> i64 {
    60
}

fn default_sweep_deadline_secs() -> u64 {
    30
}

fn default_retention_days() -> i64 {
    7
}

fn default_download_event_retention_days() -> i64 {
    90
}

fn default_rate_window_secs() -> u64 {
    60
}

fn default_upload_anon_limit() -> i64 {
    5
}

fn default_upload_user_limit() -> i64 {
    20
}

fn default_upload_ip_limit() -> i64 {
    60
}

fn default_download_anon_limit() -> i64 {
    30
}

fn default_download_user_limit() -> i64 {
    120
}

fn default_download_ip_limit() -> i64 {
    300
}

fn default_api_anon_limit() -> i64 {
    60
}

fn default_api_user_limit() -> i64 {
    240
}

fn default_api_ip_limit() -> i64 {
    600
}

fn default_auth_anon_limit() -> i64 {
    5
}

fn default_auth_user_limit() -> i64 {
    10
}

fn default_auth_ip_limit() -> i64 {
    20
}

fn default_session_cookie() -> String {
    "fb_session".to_string()
}

fn default_session_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_room_cap() -> usize {
    16
}

fn default_max_rooms() -> usize {
    4096
}

fn default_send_queue_depth() -> usize {
    32
}

fn default_ws_max_frame_bytes() -> usize {
    64 * 1024
}

fn default_heartbeat_secs() -> u64 {
    15
}

fn default_idle_timeout_secs() -> i64 {
    60
}

fn default_room_id_max_len() -> usize {
    64
}

fn default_true() -> bool {
    true
}

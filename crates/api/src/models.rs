use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// Share lifecycle. Stored as text; transitions are enforced by the
/// repository's conditional updates.
///
/// ```text
/// pending_upload ─→ available ─→ expired ─→ deleted
///        └──────────────────────────↗
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ShareState {
    PendingUpload,
    Available,
    Expired,
    Deleted,
}

impl ShareState {
    pub fn as_str(self) -> &'static str {
        match self {
            ShareState::PendingUpload => "pending_upload",
            ShareState::Available => "available",
            ShareState::Expired => "expired",
            ShareState::Deleted => "deleted",
        }
    }
}

/// One cloud-stored file exchange.
///
/// `storage_key` is the sole source of truth for object identity;
/// `original_name` is display-only. `sweep_attempts` and `next_sweep_at`
/// carry the sweeper's per-share retry back-off; `deleted_at` drives the
/// retention pass.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Share {
    pub id: String,
    pub owner_user_id: Option<Uuid>,
    pub storage_key: String,
    pub original_name: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub download_count: i64,
    pub state: ShareState,
    pub sweep_attempts: i32,
    pub next_sweep_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Share {
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Expiry is checked by timestamp, not state, so a share past
    /// `expires_at` is rejected even before the sweeper reaches it.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Session binding stored in Redis, keyed by the opaque session token the
/// identity-provider glue handed to the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

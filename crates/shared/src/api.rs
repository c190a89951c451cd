//! Shared HTTP API request/response types.

use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Max length of an original filename we accept.
const MAX_FILENAME_LEN: usize = 500;
/// Max MIME type length (RFC 6838 types are far shorter in practice).
const MAX_MIME_LEN: usize = 255;
/// Password bounds for password-protected shares.
const MIN_PASSWORD_LEN: usize = 6;
const MAX_PASSWORD_LEN: usize = 128;

/// Request a presigned upload URL for a new share.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct PresignUploadPayload {
    /// Original filename as the user sees it. Display-only; the storage key
    /// is derived from a sanitized copy.
    #[garde(length(min = 1, max = MAX_FILENAME_LEN))]
    pub filename: String,
    /// Declared object size in bytes.
    #[garde(range(min = 0))]
    pub size_bytes: i64,
    #[garde(length(min = 1, max = MAX_MIME_LEN))]
    pub mime_type: String,
    /// Requested lifetime; must be one of the server's allowed durations.
    #[garde(range(min = 1))]
    pub expiry_hours: i64,
    /// Optional password gate, hashed server-side before storage.
    #[garde(inner(length(min = MIN_PASSWORD_LEN, max = MAX_PASSWORD_LEN)))]
    pub password: Option<String>,
}

/// Headers the client must send on the presigned PUT.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadHeaders {
    pub content_type: String,
    pub content_length: i64,
}

/// Returned by `POST /upload/presign`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PresignUploadResponse {
    pub share_id: String,
    pub upload_url: String,
    pub headers: UploadHeaders,
    /// When the presigned PUT URL stops working.
    pub url_expires_at: DateTime<Utc>,
    /// When the share itself expires.
    pub expires_at: DateTime<Utc>,
}

/// Confirm the PUT completed so the share becomes downloadable.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct FinalizeUploadPayload {
    #[garde(length(min = 1, max = 64))]
    pub share_id: String,
    /// Size the client observed after upload; verified against the store.
    #[garde(inner(range(min = 0)))]
    pub size_bytes: Option<i64>,
}

/// Returned by `POST /upload/finalize`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FinalizeUploadResponse {
    pub share_id: String,
    pub state: String,
    pub expires_at: DateTime<Utc>,
}

/// Public metadata view of a share (`GET /share/{id}`). Never contains a
/// presigned URL.
#[derive(Debug, Serialize, Deserialize)]
pub struct ShareInfo {
    pub share_id: String,
    pub original_name: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub expires_at: DateTime<Utc>,
    pub has_password: bool,
}

/// Body of `POST /share/{id}/download`.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct DownloadPayload {
    #[garde(inner(length(min = 1, max = MAX_PASSWORD_LEN)))]
    #[serde(default)]
    pub password: Option<String>,
}

/// Returned by `POST /share/{id}/download`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub download_url: String,
    pub filename: String,
    pub size_bytes: i64,
    /// When the presigned GET URL stops working.
    pub url_expires_at: DateTime<Utc>,
}

/// One of the caller's shares in `GET /files`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ShareSummary {
    pub share_id: String,
    pub original_name: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub download_count: i64,
    pub state: String,
    pub has_password: bool,
}

/// Body of `POST /files/{id}/password`.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct SetPasswordPayload {
    #[garde(inner(length(min = MIN_PASSWORD_LEN, max = MAX_PASSWORD_LEN)))]
    pub password: Option<String>,
    /// Let the server mint a random password and return it once.
    #[garde(skip)]
    #[serde(default)]
    pub auto_generate: bool,
}

/// Returned by `POST /files/{id}/password`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SetPasswordResponse {
    pub share_id: String,
    pub has_password: bool,
    /// Present only when the server generated the password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_password: Option<String>,
}

/// Returned by `GET /limits`: static policy plus the caller's usage.
#[derive(Debug, Serialize, Deserialize)]
pub struct LimitsResponse {
    pub max_size_bytes: i64,
    pub allowed_expiry_hours: Vec<i64>,
    pub storage_quota_bytes: i64,
    pub max_pending_uploads: i64,
    pub used_storage_bytes: i64,
    pub active_shares: i64,
}

/// Current principal (`GET /auth/user`).
#[derive(Debug, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
}

/// Body of `POST /auth/session` - the hook the identity-provider glue
/// calls after a successful sign-in to bind a session.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateSessionPayload {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 1, max = 200))]
    pub display_name: String,
}

/// Returned by `POST /auth/session`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    /// Opaque session token, also set as the session cookie.
    pub token: String,
    pub user: UserInfo,
}

/// Returned by `GET /p2p/status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct P2pStatus {
    pub status: String,
    pub rooms: usize,
    pub peers: usize,
}

/// Returned by `POST /p2p/generate-room`.
#[derive(Debug, Serialize, Deserialize)]
pub struct GeneratedRoom {
    pub room_id: String,
    pub join_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presign_payload_rejects_empty_filename() {
        let payload = PresignUploadPayload {
            filename: String::new(),
            size_bytes: 10,
            mime_type: "application/pdf".into(),
            expiry_hours: 2,
            password: None,
        };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn presign_payload_rejects_short_password() {
        let payload = PresignUploadPayload {
            filename: "report.pdf".into(),
            size_bytes: 10,
            mime_type: "application/pdf".into(),
            expiry_hours: 2,
            password: Some("abc".into()),
        };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn presign_payload_accepts_valid_input() {
        let payload = PresignUploadPayload {
            filename: "report.pdf".into(),
            size_bytes: 1_048_576,
            mime_type: "application/pdf".into(),
            expiry_hours: 2,
            password: Some("correct horse".into()),
        };
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn download_payload_password_defaults_to_none() {
        let payload: DownloadPayload = serde_json::from_str("{}").unwrap();
        assert!(payload.password.is_none());
    }
}

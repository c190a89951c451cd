//! Public share endpoints: metadata view and download issuance.
//!
//! Expiry is checked by timestamp before anything else, so a share past
//! `expires_at` answers `expired` even while the sweeper has not reached
//! it yet. Expired and deleted shares share one uniform "no longer
//! available" message so callers cannot distinguish never-existed from
//! recently-expired.
//!
//! `download_count` increments exactly once per successful presign
//! issuance, atomically with the availability check.

use axum::{
    Json, Router, debug_handler,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{Duration, Utc};
use garde::Validate;
use shared::api::{DownloadPayload, DownloadResponse, ShareInfo};

use crate::{
    admission::{self, RateBucket},
    error::{AppError, ErrorCode},
    middleware::auth::Client,
    models::{Share, ShareState},
    services::password,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{share_id}", get(share_info))
        .route("/{share_id}/download", post(request_download))
}

/// Reject shares that are past expiry or out of the `available` state.
/// One message for every terminal case, by design.
fn ensure_live(share: &Share) -> Result<(), AppError> {
    if share.is_expired(Utc::now()) {
        return Err(AppError::External(
            ErrorCode::Expired,
            "Share is no longer available",
        ));
    }
    match share.state {
        ShareState::Available => Ok(()),
        ShareState::PendingUpload => Err(AppError::External(
            ErrorCode::NotFound,
            "Share not found",
        )),
        ShareState::Expired | ShareState::Deleted => Err(AppError::External(
            ErrorCode::Gone,
            "Share is no longer available",
        )),
    }
}

#[debug_handler]
async fn share_info(
    client: Client,
    State(state): State<AppState>,
    Path(share_id): Path<String>,
) -> Result<impl IntoResponse + std::fmt::Debug, AppError> {
    admission::check(&state, RateBucket::Api, &client.principal, &client.ip_hash).await?;

    let share = state
        .repos
        .shares
        .find_by_id(&share_id)
        .await?
        .ok_or(AppError::External(ErrorCode::NotFound, "Share not found"))?;

    ensure_live(&share)?;

    let has_password = share.has_password();
    Ok(Json(ShareInfo {
        share_id: share.id,
        original_name: share.original_name,
        size_bytes: share.size_bytes,
        mime_type: share.mime_type,
        expires_at: share.expires_at,
        has_password,
    }))
}

#[debug_handler]
async fn request_download(
    client: Client,
    State(state): State<AppState>,
    Path(share_id): Path<String>,
    Json(payload): Json<DownloadPayload>,
) -> Result<impl IntoResponse + std::fmt::Debug, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    admission::check(&state, RateBucket::Download, &client.principal, &client.ip_hash).await?;

    let share = state
        .repos
        .shares
        .find_by_id(&share_id)
        .await?
        .ok_or(AppError::External(ErrorCode::NotFound, "Share not found"))?;

    ensure_live(&share)?;

    if let Some(hash) = &share.password_hash {
        match payload.password.as_deref() {
            None => {
                password_penalty(&state, &client).await?;
                return Err(AppError::External(
                    ErrorCode::PasswordRequired,
                    "This share requires a password",
                ));
            }
            Some(candidate) => {
                if !password::verify_password(candidate, hash)? {
                    password_penalty(&state, &client).await?;
                    return Err(AppError::External(
                        ErrorCode::PasswordIncorrect,
                        "Incorrect password",
                    ));
                }
            }
        }
    }

    // Atomic availability check + counter bump; losing the race with
    // expiry or revocation answers exactly like an expired share.
    let now = Utc::now();
    let Some(share) = state.repos.shares.issue_download(&share_id, now).await? else {
        return Err(AppError::External(
            ErrorCode::Expired,
            "Share is no longer available",
        ));
    };

    let url_ttl = std::time::Duration::from_secs(state.config.download_url_ttl_secs);
    let download_url = state
        .storage
        .presign_get(&share.storage_key, &share.original_name, url_ttl)
        .await?;

    state
        .repos
        .downloads
        .append(&share.id, &client.ip_hash)
        .await?;

    state.metrics.downloads_issued.inc();
    tracing::info!(
        share_id = %share.id,
        download_count = share.download_count,
        "download issued"
    );

    Ok(Json(DownloadResponse {
        download_url,
        filename: share.original_name,
        size_bytes: share.size_bytes,
        url_expires_at: now + Duration::seconds(state.config.download_url_ttl_secs as i64),
    }))
}

/// Wrong or missing passwords burn a token from the stricter auth bucket
/// on top of the download bucket, to slow brute-force attempts.
async fn password_penalty(state: &AppState, client: &Client) -> Result<(), AppError> {
    state.metrics.password_rejections.inc();
    admission::check(state, RateBucket::Auth, &client.principal, &client.ip_hash).await
}

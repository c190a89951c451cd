//! Upload issuance endpoints.
//!
//! The server never touches file bytes. A client asks for a presigned PUT
//! URL, uploads directly to the object store, then finalizes so the share
//! becomes downloadable:
//!
//! ```text
//! POST /upload/presign   → share in pending_upload + presigned PUT URL
//! (client PUTs the bytes straight to the store)
//! POST /upload/finalize  → HEAD-verify the object, share → available
//! ```
//!
//! A finalize for an object that never arrived (or arrived with the wrong
//! size) abandons the share; the sweeper completes the teardown.

use axum::{
    Json, Router, debug_handler,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use chrono::{Duration, Utc};
use garde::Validate;
use shared::api::{
    FinalizeUploadPayload, FinalizeUploadResponse, PresignUploadPayload, PresignUploadResponse,
    UploadHeaders,
};

use crate::{
    admission::{self, RateBucket},
    error::{AppError, ErrorCode},
    middleware::auth::{Client, Principal},
    models::{Share, ShareState},
    repos::NewShare,
    services::{new_share_id, password, storage_key},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/presign", post(presign_upload))
        .route("/finalize", post(finalize_upload))
}

#[debug_handler]
async fn presign_upload(
    client: Client,
    State(state): State<AppState>,
    Json(payload): Json<PresignUploadPayload>,
) -> Result<impl IntoResponse + std::fmt::Debug, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let owner = match client.principal {
        Principal::User(id) => Some(id),
        Principal::Anonymous if state.config.anonymous_shares => None,
        Principal::Anonymous => {
            return Err(AppError::External(
                ErrorCode::Unauthenticated,
                "Sign in to create shares",
            ));
        }
    };

    admission::check(&state, RateBucket::Upload, &client.principal, &client.ip_hash).await?;

    if payload.size_bytes > state.config.max_size_bytes {
        return Err(AppError::External(
            ErrorCode::Oversize,
            "File exceeds the maximum size",
        ));
    }
    if state
        .config
        .mime_blocklist
        .iter()
        .any(|prefix| payload.mime_type.starts_with(prefix.as_str()))
    {
        return Err(AppError::External(
            ErrorCode::UnsupportedMedia,
            "This file type is not accepted",
        ));
    }
    if !state
        .config
        .allowed_expiry_hours
        .contains(&payload.expiry_hours)
    {
        return Err(AppError::Validation(
            "expiry_hours must be one of the allowed durations".into(),
        ));
    }

    if let Some(owner_id) = owner {
        let usage = state.repos.shares.usage_by_owner(owner_id).await?;
        if usage.used_bytes + payload.size_bytes > state.config.storage_quota_bytes {
            return Err(AppError::External(
                ErrorCode::QuotaExceeded,
                "Storage quota exceeded",
            ));
        }
        if usage.pending_uploads >= state.config.max_pending_uploads {
            return Err(AppError::External(
                ErrorCode::QuotaExceeded,
                "Too many uploads in flight",
            ));
        }
    }

    let password_hash = payload
        .password
        .as_deref()
        .map(password::hash_password)
        .transpose()?;

    // Every call allocates a fresh id; clients must not reuse them across
    // retries.
    let now = Utc::now();
    let share_id = new_share_id();
    let key = storage_key(&share_id, &payload.filename);
    let expires_at = now + Duration::hours(payload.expiry_hours);

    let share = state
        .repos
        .shares
        .create_pending(&NewShare {
            id: share_id.clone(),
            owner_user_id: owner,
            storage_key: key.clone(),
            original_name: payload.filename.clone(),
            size_bytes: payload.size_bytes,
            mime_type: payload.mime_type.clone(),
            password_hash,
            expires_at,
        })
        .await?;

    let url_ttl = std::time::Duration::from_secs(state.config.upload_url_ttl_secs);
    let upload_url = state
        .storage
        .presign_put(&key, payload.size_bytes, &payload.mime_type, url_ttl)
        .await?;

    state.metrics.uploads_presigned.inc();
    tracing::info!(
        share_id = %share.id,
        size_bytes = payload.size_bytes,
        anonymous = owner.is_none(),
        "upload presigned"
    );

    Ok((
        StatusCode::CREATED,
        Json(PresignUploadResponse {
            share_id: share.id,
            upload_url,
            headers: UploadHeaders {
                content_type: payload.mime_type,
                content_length: payload.size_bytes,
            },
            url_expires_at: now + Duration::seconds(state.config.upload_url_ttl_secs as i64),
            expires_at,
        }),
    ))
}

#[debug_handler]
async fn finalize_upload(
    client: Client,
    State(state): State<AppState>,
    Json(payload): Json<FinalizeUploadPayload>,
) -> Result<impl IntoResponse + std::fmt::Debug, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    admission::check(&state, RateBucket::Api, &client.principal, &client.ip_hash).await?;

    let share = state
        .repos
        .shares
        .find_by_id(&payload.share_id)
        .await?
        .ok_or(AppError::External(ErrorCode::NotFound, "Share not found"))?;

    match share.state {
        // Repeated finalize after success is a no-op.
        ShareState::Available => return Ok(Json(finalize_response(&share))),
        ShareState::PendingUpload => {}
        ShareState::Expired | ShareState::Deleted => {
            return Err(AppError::External(
                ErrorCode::Gone,
                "Share is no longer available",
            ));
        }
    }

    let now = Utc::now();
    if share.is_expired(now) {
        return Err(AppError::External(
            ErrorCode::Expired,
            "Share is no longer available",
        ));
    }

    let meta = state.storage.head(&share.storage_key).await?;
    let verified_size = match meta {
        Some(meta)
            if meta.size_bytes == share.size_bytes
                && payload.size_bytes.map_or(true, |s| s == meta.size_bytes) =>
        {
            meta.size_bytes
        }
        Some(_) | None => {
            // Nothing (or the wrong thing) arrived at the store; abandon
            // the share and let the sweeper finish the teardown.
            state.repos.shares.abandon_pending(&share.id).await?;
            tracing::warn!(share_id = %share.id, "finalize without a matching object");
            return Err(AppError::External(
                ErrorCode::NotFound,
                "Uploaded object not found",
            ));
        }
    };

    match state
        .repos
        .shares
        .mark_available(&share.id, verified_size)
        .await?
    {
        Some(updated) => {
            state.metrics.uploads_finalized.inc();
            tracing::info!(share_id = %updated.id, size_bytes = verified_size, "share available");
            Ok(Json(finalize_response(&updated)))
        }
        // Lost a race with a concurrent finalize; report whatever won.
        None => {
            let current = state
                .repos
                .shares
                .find_by_id(&share.id)
                .await?
                .ok_or(AppError::External(ErrorCode::NotFound, "Share not found"))?;
            if current.state == ShareState::Available {
                Ok(Json(finalize_response(&current)))
            } else {
                Err(AppError::External(
                    ErrorCode::InvalidState,
                    "Share cannot be finalized",
                ))
            }
        }
    }
}

fn finalize_response(share: &Share) -> FinalizeUploadResponse {
    FinalizeUploadResponse {
        share_id: share.id.clone(),
        state: share.state.as_str().to_string(),
        expires_at: share.expires_at,
    }
}

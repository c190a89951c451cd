//! Owner-facing share management.
//!
//! ## Endpoints
//!
//! - GET    /files                        - list the caller's shares
//! - DELETE /files/{share_id}             - revoke a share
//! - POST   /files/{share_id}/password    - set or auto-generate a password
//! - DELETE /files/{share_id}/password    - remove password protection
//!
//! Revocation routes the share through the standard cleanup path: it is
//! transitioned to `expired`, the object deletion is attempted inline, and
//! on success the share lands in `deleted` before the response returns. A
//! failed deletion leaves the share for the sweeper's retry cycle.

use axum::{
    Json, Router, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use chrono::{Duration, Utc};
use garde::Validate;
use shared::api::{SetPasswordPayload, SetPasswordResponse, ShareSummary};

use crate::{
    admission::{self, RateBucket},
    error::{AppError, ErrorCode},
    middleware::auth::Client,
    models::{Share, ShareState},
    repos::RevokeOutcome,
    services::password,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_files))
        .route("/{share_id}", delete(revoke_share))
        .route(
            "/{share_id}/password",
            post(set_password).delete(remove_password),
        )
}

#[debug_handler]
async fn list_files(
    client: Client,
    State(state): State<AppState>,
) -> Result<impl IntoResponse + std::fmt::Debug, AppError> {
    let owner = client.require_user()?;
    admission::check(&state, RateBucket::Api, &client.principal, &client.ip_hash).await?;

    let now = Utc::now();
    let shares = state.repos.shares.list_by_owner(owner).await?;
    let summaries: Vec<ShareSummary> = shares.iter().map(|s| summarize(s, now)).collect();

    Ok(Json(summaries))
}

fn summarize(share: &Share, now: chrono::DateTime<Utc>) -> ShareSummary {
    // A share past expiry reads as expired even before the sweeper has
    // transitioned the row.
    let state = if share.is_expired(now)
        && matches!(
            share.state,
            ShareState::PendingUpload | ShareState::Available
        ) {
        ShareState::Expired
    } else {
        share.state
    };

    ShareSummary {
        share_id: share.id.clone(),
        original_name: share.original_name.clone(),
        size_bytes: share.size_bytes,
        mime_type: share.mime_type.clone(),
        created_at: share.created_at,
        expires_at: share.expires_at,
        download_count: share.download_count,
        state: state.as_str().to_string(),
        has_password: share.has_password(),
    }
}

#[debug_handler]
async fn revoke_share(
    client: Client,
    State(state): State<AppState>,
    Path(share_id): Path<String>,
) -> Result<impl IntoResponse + std::fmt::Debug, AppError> {
    let owner = client.require_user()?;
    admission::check(&state, RateBucket::Api, &client.principal, &client.ip_hash).await?;

    match state.repos.shares.begin_revoke(&share_id, owner).await? {
        RevokeOutcome::Revoked(share) => {
            match state.storage.delete(&share.storage_key).await {
                Ok(()) => {
                    state.repos.shares.mark_deleted(&share.id).await?;
                }
                Err(err) => {
                    // Leave it 'expired'; the sweeper retries with back-off.
                    tracing::warn!(
                        share_id = %share.id,
                        "object deletion failed during revoke: {:?}",
                        err
                    );
                    state
                        .repos
                        .shares
                        .record_sweep_failure(
                            &share.id,
                            Utc::now() + Duration::seconds(state.config.sweep_backoff_base_secs),
                        )
                        .await?;
                }
            }
            state.metrics.shares_revoked.inc();
            tracing::info!(share_id = %share.id, owner = %owner, "share revoked");
            Ok(StatusCode::OK)
        }
        RevokeOutcome::NotFound => {
            Err(AppError::External(ErrorCode::NotFound, "Share not found"))
        }
        RevokeOutcome::NotOwner => Err(AppError::External(
            ErrorCode::Forbidden,
            "Not authorized to delete this share",
        )),
        RevokeOutcome::InvalidState(_) => Err(AppError::External(
            ErrorCode::InvalidState,
            "Share is already deleted",
        )),
    }
}

#[debug_handler]
async fn set_password(
    client: Client,
    State(state): State<AppState>,
    Path(share_id): Path<String>,
    Json(payload): Json<SetPasswordPayload>,
) -> Result<impl IntoResponse + std::fmt::Debug, AppError> {
    let owner = client.require_user()?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    admission::check(&state, RateBucket::Api, &client.principal, &client.ip_hash).await?;

    let generated = payload.auto_generate.then(password::generate_password);
    let chosen = match (&generated, &payload.password) {
        (Some(generated), _) => generated.clone(),
        (None, Some(password)) => password.clone(),
        (None, None) => {
            return Err(AppError::Validation(
                "password is required unless auto_generate is set".into(),
            ));
        }
    };

    let hash = password::hash_password(&chosen)?;
    let updated = state
        .repos
        .shares
        .set_password_hash(&share_id, owner, Some(hash))
        .await?;
    if !updated {
        return Err(AppError::External(
            ErrorCode::NotFound,
            "Share not found or no longer editable",
        ));
    }

    tracing::info!(share_id = %share_id, "password protection enabled");
    Ok(Json(SetPasswordResponse {
        share_id,
        has_password: true,
        // Only server-minted passwords are echoed back, and only once.
        generated_password: generated,
    }))
}

#[debug_handler]
async fn remove_password(
    client: Client,
    State(state): State<AppState>,
    Path(share_id): Path<String>,
) -> Result<impl IntoResponse + std::fmt::Debug, AppError> {
    let owner = client.require_user()?;
    admission::check(&state, RateBucket::Api, &client.principal, &client.ip_hash).await?;

    let updated = state
        .repos
        .shares
        .set_password_hash(&share_id, owner, None)
        .await?;
    if !updated {
        return Err(AppError::External(
            ErrorCode::NotFound,
            "Share not found or no longer editable",
        ));
    }

    tracing::info!(share_id = %share_id, "password protection removed");
    Ok(Json(SetPasswordResponse {
        share_id,
        has_password: false,
        generated_password: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::auth::Principal;
    use crate::repos::MockShareRepo;
    use crate::services::MockObjectStore;
    use crate::stores::{MockRateLimiter, RateLimitResult};
    use crate::test_utils::{TestStateBuilder, mock_share};
    use chrono::Duration as ChronoDuration;
    use http_body_util::BodyExt;
    use uuid::Uuid;

    fn open_rate_limiter() -> MockRateLimiter {
        let mut rate_limiter = MockRateLimiter::new();
        rate_limiter
            .expect_check()
            .returning(|_, _, _| Ok(RateLimitResult::Allowed(1)));
        rate_limiter
    }

    fn user_client(id: Uuid) -> Client {
        Client {
            principal: Principal::User(id),
            ip_hash: "ip-hash".into(),
        }
    }

    #[tokio::test]
    async fn anonymous_caller_cannot_list_files() {
        let state = TestStateBuilder::new().build();
        let client = Client {
            principal: Principal::Anonymous,
            ip_hash: "ip-hash".into(),
        };

        let err = list_files(client, State(state)).await.unwrap_err();
        match err {
            AppError::External(code, _) => assert_eq!(code, ErrorCode::Unauthenticated),
            _ => panic!("expected unauthenticated"),
        }
    }

    #[tokio::test]
    async fn list_files_reports_effective_state() {
        let owner = Uuid::new_v4();
        let live = mock_share("live", ShareState::Available);
        let mut stale = mock_share("stale", ShareState::Available);
        stale.expires_at = Utc::now() - ChronoDuration::minutes(1);

        let mut share_repo = MockShareRepo::new();
        let rows = vec![live, stale];
        share_repo
            .expect_list_by_owner()
            .returning(move |_| Ok(rows.clone()));

        let state = TestStateBuilder::new()
            .with_share_repo(share_repo)
            .with_rate_limiter(open_rate_limiter())
            .build();

        let result = list_files(user_client(owner), State(state)).await.unwrap();
        let response = result.into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Vec<ShareSummary> = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body.len(), 2);
        assert_eq!(body[0].state, "available");
        // Not yet swept, but past expiry: shown as expired.
        assert_eq!(body[1].state, "expired");
    }

    #[tokio::test]
    async fn revoke_deletes_object_and_marks_deleted() {
        let owner = Uuid::new_v4();
        let mut share = mock_share("rv-1", ShareState::Available);
        share.owner_user_id = Some(owner);

        let mut share_repo = MockShareRepo::new();
        let mut revoked = share.clone();
        revoked.state = ShareState::Expired;
        share_repo
            .expect_begin_revoke()
            .withf(move |id, o| id == "rv-1" && *o == owner)
            .returning(move |_, _| Ok(RevokeOutcome::Revoked(revoked.clone())));
        share_repo
            .expect_mark_deleted()
            .withf(|id| id == "rv-1")
            .times(1)
            .returning(|_| Ok(true));

        let mut storage = MockObjectStore::new();
        let key = share.storage_key.clone();
        storage
            .expect_delete()
            .withf(move |k| k == key)
            .times(1)
            .returning(|_| Ok(()));

        let state = TestStateBuilder::new()
            .with_share_repo(share_repo)
            .with_object_store(storage)
            .with_rate_limiter(open_rate_limiter())
            .build();

        let result = revoke_share(user_client(owner), State(state.clone()), Path("rv-1".into()))
            .await
            .unwrap();
        assert_eq!(result.into_response().status(), StatusCode::OK);
        assert_eq!(state.metrics.shares_revoked.get(), 1);
    }

    #[tokio::test]
    async fn revoke_with_failing_store_leaves_share_for_sweeper() {
        let owner = Uuid::new_v4();
        let mut share = mock_share("rv-2", ShareState::Available);
        share.owner_user_id = Some(owner);

        let mut share_repo = MockShareRepo::new();
        let mut revoked = share.clone();
        revoked.state = ShareState::Expired;
        share_repo
            .expect_begin_revoke()
            .returning(move |_, _| Ok(RevokeOutcome::Revoked(revoked.clone())));
        share_repo
            .expect_record_sweep_failure()
            .times(1)
            .returning(|_, _| Ok(()));
        // mark_deleted must not be called when the store fails.

        let mut storage = MockObjectStore::new();
        storage
            .expect_delete()
            .returning(|_| Err(anyhow::anyhow!("store down")));

        let state = TestStateBuilder::new()
            .with_share_repo(share_repo)
            .with_object_store(storage)
            .with_rate_limiter(open_rate_limiter())
            .build();

        // Revoke still succeeds from the owner's perspective.
        let result =
            revoke_share(user_client(owner), State(state), Path("rv-2".into())).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn revoke_by_non_owner_is_forbidden() {
        let mut share_repo = MockShareRepo::new();
        share_repo
            .expect_begin_revoke()
            .returning(|_, _| Ok(RevokeOutcome::NotOwner));

        let state = TestStateBuilder::new()
            .with_share_repo(share_repo)
            .with_rate_limiter(open_rate_limiter())
            .build();

        let err = revoke_share(user_client(Uuid::new_v4()), State(state), Path("rv-3".into()))
            .await
            .unwrap_err();
        match err {
            AppError::External(code, _) => assert_eq!(code, ErrorCode::Forbidden),
            _ => panic!("expected forbidden"),
        }
    }

    #[tokio::test]
    async fn revoke_twice_is_invalid_state() {
        let mut share_repo = MockShareRepo::new();
        share_repo
            .expect_begin_revoke()
            .returning(|_, _| Ok(RevokeOutcome::InvalidState(ShareState::Deleted)));

        let state = TestStateBuilder::new()
            .with_share_repo(share_repo)
            .with_rate_limiter(open_rate_limiter())
            .build();

        let err = revoke_share(user_client(Uuid::new_v4()), State(state), Path("rv-4".into()))
            .await
            .unwrap_err();
        match err {
            AppError::External(code, _) => assert_eq!(code, ErrorCode::InvalidState),
            _ => panic!("expected invalid state"),
        }
    }

    #[tokio::test]
    async fn set_password_hashes_before_storing() {
        let owner = Uuid::new_v4();

        let mut share_repo = MockShareRepo::new();
        share_repo
            .expect_set_password_hash()
            .withf(|id, _, hash| {
                id == "pw-1"
                    && hash
                        .as_deref()
                        .is_some_and(|h| h.starts_with("$argon2"))
            })
            .times(1)
            .returning(|_, _, _| Ok(true));

        let state = TestStateBuilder::new()
            .with_share_repo(share_repo)
            .with_rate_limiter(open_rate_limiter())
            .build();

        let payload = SetPasswordPayload {
            password: Some("hunter2hunter2".into()),
            auto_generate: false,
        };
        let result = set_password(
            user_client(owner),
            State(state),
            Path("pw-1".into()),
            Json(payload),
        )
        .await
        .unwrap();

        let response = result.into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: SetPasswordResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(body.has_password);
        assert!(body.generated_password.is_none());
    }

    #[tokio::test]
    async fn auto_generated_password_is_returned_once() {
        let owner = Uuid::new_v4();

        let mut share_repo = MockShareRepo::new();
        share_repo
            .expect_set_password_hash()
            .returning(|_, _, _| Ok(true));

        let state = TestStateBuilder::new()
            .with_share_repo(share_repo)
            .with_rate_limiter(open_rate_limiter())
            .build();

        let payload = SetPasswordPayload {
            password: None,
            auto_generate: true,
        };
        let result = set_password(
            user_client(owner),
            State(state),
            Path("pw-2".into()),
            Json(payload),
        )
        .await
        .unwrap();

        let response = result.into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: SetPasswordResponse = serde_json::from_slice(&bytes).unwrap();
        let generated = body.generated_password.expect("generated password");
        assert_eq!(generated.len(), 12);
    }

    #[tokio::test]
    async fn set_password_without_input_is_a_validation_error() {
        let state = TestStateBuilder::new()
            .with_rate_limiter(open_rate_limiter())
            .build();

        let payload = SetPasswordPayload {
            password: None,
            auto_generate: false,
        };
        let err = set_password(
            user_client(Uuid::new_v4()),
            State(state),
            Path("pw-3".into()),
            Json(payload),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn remove_password_clears_the_hash() {
        let owner = Uuid::new_v4();

        let mut share_repo = MockShareRepo::new();
        share_repo
            .expect_set_password_hash()
            .withf(|id, _, hash| id == "pw-4" && hash.is_none())
            .times(1)
            .returning(|_, _, _| Ok(true));

        let state = TestStateBuilder::new()
            .with_share_repo(share_repo)
            .with_rate_limiter(open_rate_limiter())
            .build();

        let result = remove_password(user_client(owner), State(state), Path("pw-4".into()))
            .await
            .unwrap();

        let response = result.into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: SetPasswordResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(!body.has_password);
    }
}

//! Session endpoints.
//!
//! The OAuth dance happens outside the core; the identity provider's glue
//! calls `POST /auth/session` with a verified email and display name once
//! sign-in succeeds. The core upserts the user row, mints an opaque
//! session token, binds it in the session store, and sets it as a cookie.
//! Request handling afterwards only ever resolves or destroys that
//! binding.
//!
//! ## Endpoints
//!
//! - POST /auth/session - bind a session (identity-provider glue)
//! - GET  /auth/user    - current principal
//! - POST /auth/logout  - destroy the session binding

use axum::{
    Json, Router, debug_handler,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::{
    TypedHeader,
    extract::CookieJar,
    extract::cookie::Cookie,
    headers::{Authorization, authorization::Bearer},
};
use base64::prelude::*;
use chrono::Utc;
use garde::Validate;
use shared::api::{CreateSessionPayload, CreateSessionResponse, UserInfo};

use crate::{
    admission::{self, RateBucket},
    error::{AppError, ErrorCode},
    middleware::auth::{AuthUser, Client},
    models::Session,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/session", post(create_session))
        .route("/user", get(get_user))
        .route("/logout", post(logout))
}

fn new_session_token() -> String {
    let bytes: [u8; 32] = rand::random();
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

#[debug_handler]
async fn create_session(
    client: Client,
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<CreateSessionPayload>,
) -> Result<impl IntoResponse + std::fmt::Debug, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    admission::check(&state, RateBucket::Auth, &client.principal, &client.ip_hash).await?;

    let user = state
        .repos
        .users
        .upsert(&payload.email, &payload.display_name)
        .await?;

    let token = new_session_token();
    let session = Session {
        user_id: user.id,
        created_at: Utc::now(),
    };
    state
        .stores
        .sessions
        .put(&token, &session, state.config.session_ttl_secs)
        .await?;

    tracing::info!(user_id = %user.id, "session bound");

    let cookie = Cookie::build((state.config.session_cookie.clone(), token.clone()))
        .path("/")
        .http_only(true)
        .build();

    Ok((
        StatusCode::CREATED,
        jar.add(cookie),
        Json(CreateSessionResponse {
            token,
            user: UserInfo {
                id: user.id,
                email: user.email,
                display_name: user.display_name,
            },
        }),
    ))
}

#[debug_handler]
async fn get_user(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse + std::fmt::Debug, AppError> {
    let db_user = state
        .repos
        .users
        .find_by_id(user.id)
        .await?
        .ok_or(AppError::External(ErrorCode::NotFound, "User not found"))?;

    Ok(Json(UserInfo {
        id: db_user.id,
        email: db_user.email,
        display_name: db_user.display_name,
    }))
}

#[debug_handler]
async fn logout(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    jar: CookieJar,
) -> Result<impl IntoResponse + std::fmt::Debug, AppError> {
    let token = bearer
        .map(|TypedHeader(Authorization(b))| b.token().to_string())
        .or_else(|| {
            jar.get(&state.config.session_cookie)
                .map(|c| c.value().to_string())
        });

    if let Some(token) = token {
        state.stores.sessions.delete(&token).await?;
    }

    // Idempotent: logging out without a session is still a 200.
    Ok((
        jar.remove(Cookie::from(state.config.session_cookie.clone())),
        StatusCode::OK,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::MockUserRepo;
    use crate::stores::{MockRateLimiter, MockSessionStore, RateLimitResult};
    use crate::test_utils::{TestStateBuilder, mock_user};
    use http_body_util::BodyExt;

    fn open_rate_limiter() -> MockRateLimiter {
        let mut rate_limiter = MockRateLimiter::new();
        rate_limiter
            .expect_check()
            .returning(|_, _, _| Ok(RateLimitResult::Allowed(1)));
        rate_limiter
    }

    fn anon_client() -> Client {
        Client {
            principal: crate::middleware::auth::Principal::Anonymous,
            ip_hash: "ip-hash".into(),
        }
    }

    #[tokio::test]
    async fn create_session_upserts_user_and_binds_token() {
        let user = mock_user("alice@example.com");

        let mut user_repo = MockUserRepo::new();
        let upserted = user.clone();
        user_repo
            .expect_upsert()
            .withf(|email, name| email == "alice@example.com" && name == "Alice")
            .returning(move |_, _| Ok(upserted.clone()));

        let mut sessions = MockSessionStore::new();
        sessions
            .expect_put()
            .withf(|token, _, ttl| !token.is_empty() && *ttl > 0)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let state = TestStateBuilder::new()
            .with_user_repo(user_repo)
            .with_session_store(sessions)
            .with_rate_limiter(open_rate_limiter())
            .build();

        let payload = CreateSessionPayload {
            email: "alice@example.com".into(),
            display_name: "Alice".into(),
        };
        let result = create_session(anon_client(), State(state), CookieJar::new(), Json(payload))
            .await
            .unwrap();

        let response = result.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        let set_cookie = response
            .headers()
            .get("set-cookie")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(set_cookie.contains("fb_session="));

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: CreateSessionResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.user.email, "alice@example.com");
        assert!(!body.token.is_empty());
    }

    #[tokio::test]
    async fn create_session_rejects_bad_email() {
        let state = TestStateBuilder::new().build();

        let payload = CreateSessionPayload {
            email: "not-an-email".into(),
            display_name: "Alice".into(),
        };
        let err = create_session(anon_client(), State(state), CookieJar::new(), Json(payload))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn get_user_returns_principal_info() {
        let user = mock_user("alice@example.com");
        let user_id = user.id;

        let mut user_repo = MockUserRepo::new();
        let found = user.clone();
        user_repo
            .expect_find_by_id()
            .with(mockall::predicate::eq(user_id))
            .returning(move |_| Ok(Some(found.clone())));

        let state = TestStateBuilder::new().with_user_repo(user_repo).build();

        let result = get_user(AuthUser { id: user_id }, State(state))
            .await
            .unwrap();

        let response = result.into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: UserInfo = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.id, user_id);
    }

    #[tokio::test]
    async fn logout_deletes_the_session_binding() {
        let mut sessions = MockSessionStore::new();
        sessions
            .expect_delete()
            .withf(|token| token == "tok-123")
            .times(1)
            .returning(|_| Ok(true));

        let state = TestStateBuilder::new().with_session_store(sessions).build();

        let jar = CookieJar::new().add(Cookie::new("fb_session", "tok-123"));
        let result = logout(State(state), None, jar).await.unwrap();
        assert_eq!(result.into_response().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn logout_without_session_is_idempotent() {
        let state = TestStateBuilder::new().build();

        let result = logout(State(state), None, CookieJar::new()).await.unwrap();
        assert_eq!(result.into_response().status(), StatusCode::OK);
    }
}

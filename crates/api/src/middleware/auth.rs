//! Principal resolution from the session binding.
//!
//! The identity provider runs outside the core; requests arrive carrying an
//! opaque session token (cookie or bearer header) that maps to a user via
//! the session store. Resolution never authenticates anything itself - it
//! only consumes the provider's verdict.
//!
//! Usage: add `Client` as an extractor parameter for optional
//! authentication (principal + hashed IP), or `AuthUser` to require it.
//!
//! ```ignore
//! async fn my_handler(client: Client, ...) -> ... {
//!     // client.principal and client.ip_hash are available here
//! }
//! ```

use axum::{
    RequestPartsExt,
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use axum_extra::{
    TypedHeader,
    extract::CookieJar,
    headers::{Authorization, authorization::Bearer},
};
use base64::prelude::*;
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::{
    error::{AppError, ErrorCode},
    state::AppState,
};

/// The calling principal after session resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    User(Uuid),
    Anonymous,
}

impl Principal {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Principal::User(id) => Some(*id),
            Principal::Anonymous => None,
        }
    }
}

/// Request client identity: resolved principal plus the salted IP hash
/// used as a rate-limit subject. Raw IPs never leave this extractor.
pub struct Client {
    pub principal: Principal,
    pub ip_hash: String,
}

impl FromRequestParts<AppState> for Client {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let ip = client_ip(parts);
        let ip_hash = hash_ip(&state.config.ip_hash_salt, &ip);

        let Some(token) = session_token(parts, &state.config.session_cookie).await else {
            return Ok(Client {
                principal: Principal::Anonymous,
                ip_hash,
            });
        };

        let principal = match state.stores.sessions.get(&token).await {
            Ok(Some(session)) => Principal::User(session.user_id),
            // Unknown or expired token: treat as anonymous rather than
            // failing, so public endpoints keep working after logout.
            Ok(None) => Principal::Anonymous,
            Err(err) => {
                tracing::error!("session lookup failed: {:?}", err);
                return Err(AppError::External(
                    ErrorCode::Unavailable,
                    "Session store unavailable",
                ));
            }
        };

        Ok(Client { principal, ip_hash })
    }
}

impl Client {
    /// Require an authenticated principal. Handlers that also need the IP
    /// hash for admission use this instead of a second `AuthUser` lookup.
    pub fn require_user(&self) -> Result<Uuid, AppError> {
        self.principal.user_id().ok_or(AppError::External(
            ErrorCode::Unauthenticated,
            "Missing or invalid session",
        ))
    }
}

/// Authenticated user, required. Rejects with `unauthenticated` when the
/// request carries no valid session.
pub struct AuthUser {
    pub id: Uuid,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let client = Client::from_request_parts(parts, state).await?;
        match client.principal {
            Principal::User(id) => Ok(AuthUser { id }),
            Principal::Anonymous => Err(AppError::External(
                ErrorCode::Unauthenticated,
                "Missing or invalid session",
            )),
        }
    }
}

/// Pull the session token from the Authorization header, falling back to
/// the session cookie.
async fn session_token(parts: &mut Parts, cookie_name: &str) -> Option<String> {
    if let Ok(TypedHeader(Authorization(bearer))) = parts
        .extract::<TypedHeader<Authorization<Bearer>>>()
        .await
    {
        return Some(bearer.token().to_string());
    }

    let jar = CookieJar::from_headers(&parts.headers);
    jar.get(cookie_name).map(|c| c.value().to_string())
}

/// Best-effort client IP: first hop of X-Forwarded-For when present
/// (we sit behind a reverse proxy in production), else the socket peer.
fn client_ip(parts: &Parts) -> String {
    if let Some(forwarded) = parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        && let Some(first) = forwarded.split(',').next()
    {
        let first = first.trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Salted SHA-256 of the client IP, base64 URL-safe.
pub fn hash_ip(salt: &str, ip: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(ip.as_bytes());
    BASE64_URL_SAFE_NO_PAD.encode(hasher.finalize())
}

//! Usage and policy endpoint for the authenticated caller.

use axum::{Json, Router, debug_handler, extract::State, response::IntoResponse, routing::get};
use shared::api::LimitsResponse;

use crate::{
    admission::{self, RateBucket},
    error::AppError,
    middleware::auth::Client,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_limits))
}

#[debug_handler]
async fn get_limits(
    client: Client,
    State(state): State<AppState>,
) -> Result<impl IntoResponse + std::fmt::Debug, AppError> {
    let owner = client.require_user()?;
    admission::check(&state, RateBucket::Api, &client.principal, &client.ip_hash).await?;

    let usage = state.repos.shares.usage_by_owner(owner).await?;

    Ok(Json(LimitsResponse {
        max_size_bytes: state.config.max_size_bytes,
        allowed_expiry_hours: state.config.allowed_expiry_hours.clone(),
        storage_quota_bytes: state.config.storage_quota_bytes,
        max_pending_uploads: state.config.max_pending_uploads,
        used_storage_bytes: usage.used_bytes,
        active_shares: usage.active_shares,
    }))
}

//! P2P convenience endpoints around the signaling hub.
//!
//! Room ids are short and client-shareable; `generate-room` mints one the
//! way the UI expects, but any id passing the hub's charset check works.

use axum::{
    Json, Router, debug_handler, extract::State, response::IntoResponse, routing::{get, post},
};
use shared::api::{GeneratedRoom, P2pStatus};
use uuid::Uuid;

use crate::{
    admission::{self, RateBucket},
    error::AppError,
    middleware::auth::Client,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(p2p_status))
        .route("/generate-room", post(generate_room))
}

#[debug_handler]
async fn p2p_status(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.hub.stats();
    Json(P2pStatus {
        status: "active".to_string(),
        rooms: stats.rooms,
        peers: stats.peers,
    })
}

#[debug_handler]
async fn generate_room(
    client: Client,
    State(state): State<AppState>,
) -> Result<impl IntoResponse + std::fmt::Debug, AppError> {
    admission::check(&state, RateBucket::Api, &client.principal, &client.ip_hash).await?;

    let room_id = Uuid::new_v4().simple().to_string()[..8].to_string();
    Ok(Json(GeneratedRoom {
        join_url: format!("/p2p?room={room_id}"),
        room_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::auth::Principal;
    use crate::stores::{MockRateLimiter, RateLimitResult};
    use crate::test_utils::TestStateBuilder;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn status_reports_hub_counts() {
        let state = TestStateBuilder::new().build();

        let response = p2p_status(State(state)).await.into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: P2pStatus = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.status, "active");
        assert_eq!(body.peers, 0);
    }

    #[tokio::test]
    async fn generated_room_ids_are_short_and_joinable() {
        let mut rate_limiter = MockRateLimiter::new();
        rate_limiter
            .expect_check()
            .returning(|_, _, _| Ok(RateLimitResult::Allowed(1)));
        let state = TestStateBuilder::new()
            .with_rate_limiter(rate_limiter)
            .build();

        let client = Client {
            principal: Principal::Anonymous,
            ip_hash: "ip-hash".into(),
        };
        let result = generate_room(client, State(state)).await.unwrap();
        let response = result.into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: GeneratedRoom = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.room_id.len(), 8);
        assert!(body.room_id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(body.join_url.ends_with(&body.room_id));
    }
}

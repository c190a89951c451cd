//! Prometheus scrape endpoint.

use axum::{Router, extract::State, response::IntoResponse, routing::get};

use crate::{error::AppError, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(export_metrics))
}

async fn export_metrics(State(state): State<AppState>) -> Result<impl IntoResponse + std::fmt::Debug, AppError> {
    let body = state.metrics.export()?;
    Ok((
        [("content-type", "text/plain; version=0.0.4")],
        body,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestStateBuilder;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn scrape_returns_text_exposition() {
        let state = TestStateBuilder::new().build();
        state.metrics.uploads_presigned.inc();

        let response = export_metrics(State(state)).await.unwrap().into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("filebeam_uploads_presigned_total 1"));
    }
}

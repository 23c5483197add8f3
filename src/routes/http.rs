// GET handlers: version, metrics

use axum::{
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};

use super::AppState;
use crate::version;

/// GET /version: service name and version from Cargo.toml at build time.
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(version::info())
}

/// GET /metrics: Prometheus text exposition of the exported counters.
pub(super) async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let Some(registry) = state.metrics.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match registry.encode_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, operation = "encode_metrics", "metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

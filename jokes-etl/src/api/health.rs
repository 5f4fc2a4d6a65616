//! Health check endpoint

use axum::extract::State;
use axum::{routing::get, Json, Router};
use jokes_common::api::HealthResponse;
use tracing::warn;

use crate::{build_info, AppState, MODULE};

/// GET /health
///
/// Pings the store; an unreachable store reports `"degraded"`.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut response = HealthResponse::new(MODULE, build_info(), state.broker.is_connected().await);
    response.store = Some(state.store.backend().to_string());
    if let Err(e) = state.store.ping().await {
        warn!("Store ping failed: {}", e);
        response.status = "degraded";
    }
    Json(response)
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

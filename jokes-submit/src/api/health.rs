//! Health check endpoint

use axum::extract::State;
use axum::{routing::get, Json, Router};
use jokes_common::api::HealthResponse;

use crate::{build_info, AppState, MODULE};

/// GET /health
///
/// Reports broker link state and the size of the local type cache.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut response = HealthResponse::new(MODULE, build_info(), state.broker.is_connected().await);
    response.cached_types = Some(state.cache.len().await);
    Json(response)
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

//! jokes-etl - Persistence/ETL worker
//!
//! Consumes approved jokes from `MODERATED_QUESTIONS`, writes them to the
//! configured store, and broadcasts the full taxonomy whenever a new type
//! appears. Also serves the stored jokes over HTTP.

use axum::Router;
use jokes_common::api::BuildInfo;
use jokes_common::broker::Broker;
use jokes_common::store::JokeStore;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod handler;

/// Module name used in logs and health output
pub const MODULE: &str = "etl";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3000;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JokeStore>,
    pub broker: Arc<dyn Broker>,
}

impl AppState {
    pub fn new(store: Arc<dyn JokeStore>, broker: Arc<dyn Broker>) -> Self {
        Self { store, broker }
    }
}

/// Build identification baked in by the shared build script
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        git_hash: env!("GIT_HASH"),
        build_timestamp: env!("BUILD_TIMESTAMP"),
        build_profile: env!("BUILD_PROFILE"),
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::joke_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

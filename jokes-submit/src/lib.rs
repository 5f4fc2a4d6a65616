//! jokes-submit - Submission gateway
//!
//! Accepts joke proposals over HTTP and queues them for moderation. Keeps a
//! local replica of the joke taxonomy, fed by broadcasts from the ETL worker,
//! so `/types` never depends on the broker or the store.

use axum::Router;
use jokes_common::api::BuildInfo;
use jokes_common::broker::Broker;
use jokes_common::type_cache::TypeCache;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;

/// Module name used in logs, health output, and default queue/cache names
pub const MODULE: &str = "submit";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3200;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<dyn Broker>,
    pub cache: Arc<TypeCache>,
}

impl AppState {
    pub fn new(broker: Arc<dyn Broker>, cache: Arc<TypeCache>) -> Self {
        Self { broker, cache }
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
        .merge(api::submit_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! Submission endpoints
//!
//! - POST /submit: validate and queue a joke for moderation
//! - GET /types: cached taxonomy

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use jokes_common::api::json_body;
use jokes_common::broker::{Route, SUBMITTED_QUEUE};
use jokes_common::messages::JokeDraft;
use jokes_common::Result;
use serde::Serialize;
use tracing::info;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub status: &'static str,
}

/// POST /submit
///
/// Every field must be present and non-blank; the type is lower-cased before
/// the message is queued. Returns as soon as the broker confirms the publish.
pub async fn submit_joke(
    State(state): State<AppState>,
    payload: std::result::Result<Json<JokeDraft>, JsonRejection>,
) -> Result<Json<SubmitResponse>> {
    let joke = json_body(payload)?.into_payload()?;

    state
        .broker
        .publish(Route::Queue(SUBMITTED_QUEUE), &joke.to_bytes()?)
        .await?;

    info!("Queued submission of type '{}'", joke.joke_type);
    Ok(Json(SubmitResponse { status: "queued" }))
}

/// GET /types
///
/// Served from the local cache only.
pub async fn list_types(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.cache.snapshot().await)
}

pub fn submit_routes() -> Router<AppState> {
    Router::new()
        .route("/submit", post(submit_joke))
        .route("/types", get(list_types))
}

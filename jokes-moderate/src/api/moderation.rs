//! Moderation endpoints
//!
//! - GET /moderate: next pending submission
//! - POST /moderated: reviewer decision
//! - GET /types: cached taxonomy
//!
//! **Delivery guarantee:** `/moderate` acknowledges the message as soon as it
//! is fetched, before any decision. An item handed to a reviewer who never
//! posts a decision is gone; the queue does not get it back.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use jokes_common::api::json_body;
use jokes_common::broker::{Route, MODERATED_QUEUE, SUBMITTED_QUEUE};
use jokes_common::messages::{JokeDraft, JokePayload};
use jokes_common::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::AppState;

/// Body of GET /moderate
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum NextItem {
    Item(JokePayload),
    Empty { message: &'static str },
}

/// Body of POST /moderated
#[derive(Debug, Deserialize)]
pub struct ModerationDecision {
    pub approved: bool,
    #[serde(flatten)]
    pub joke: JokeDraft,
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub status: &'static str,
}

/// GET /moderate
///
/// Non-blocking fetch from the submission queue. An empty queue is a normal
/// answer, not an error.
pub async fn next_item(State(state): State<AppState>) -> Result<Json<NextItem>> {
    match state.broker.get(SUBMITTED_QUEUE).await? {
        Some(bytes) => {
            let item = JokePayload::from_bytes(&bytes)?;
            debug!("Serving submission of type '{}' for review", item.joke_type);
            Ok(Json(NextItem::Item(item)))
        }
        None => Ok(Json(NextItem::Empty {
            message: "no items",
        })),
    }
}

/// POST /moderated
///
/// Rejections are dropped without touching the broker. Approvals must carry
/// every field; the type is lower-cased before forwarding.
pub async fn record_decision(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ModerationDecision>, JsonRejection>,
) -> Result<Json<DecisionResponse>> {
    let decision = json_body(payload)?;

    if !decision.approved {
        info!("Submission rejected by reviewer");
        return Ok(Json(DecisionResponse { status: "rejected" }));
    }

    let joke = decision.joke.into_payload()?;
    state
        .broker
        .publish(Route::Queue(MODERATED_QUEUE), &joke.to_bytes()?)
        .await?;

    info!("Approved joke of type '{}' forwarded for persistence", joke.joke_type);
    Ok(Json(DecisionResponse { status: "accepted" }))
}

/// GET /types
pub async fn list_types(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.cache.snapshot().await)
}

pub fn moderation_routes() -> Router<AppState> {
    Router::new()
        .route("/moderate", get(next_item))
        .route("/moderated", post(record_decision))
        .route("/types", get(list_types))
}

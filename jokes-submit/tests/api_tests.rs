//! Integration tests for jokes-submit API endpoints
//!
//! Tests cover:
//! - Valid submissions queue exactly one message with the type lower-cased
//! - Incomplete or malformed submissions queue nothing (400)
//! - Broker outage surfaces as 503
//! - `/types` serves the local cache
//! - Health endpoint

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use jokes_common::broker::{MemoryBroker, Topology, SUBMITTED_QUEUE};
use jokes_common::messages::JokePayload;
use jokes_common::type_cache::{TypeCache, DEFAULT_TYPES};
use jokes_submit::{build_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

/// Test helper: app backed by an in-memory broker and a temp cache file
async fn setup_app() -> (axum::Router, MemoryBroker, Arc<TypeCache>, TempDir) {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(TypeCache::open(dir.path().join("submit-types.json")).await.unwrap());
    let broker = MemoryBroker::new(&Topology::pipeline(Some("submit_type_updates")));
    let state = AppState::new(Arc::new(broker.clone()), cache.clone());
    (build_router(state), broker, cache, dir)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn test_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

// =============================================================================
// POST /submit
// =============================================================================

#[tokio::test]
async fn test_submit_queues_one_message() {
    let (app, broker, _cache, _dir) = setup_app().await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/submit",
            json!({
                "setup": "Why did the chicken cross the road?",
                "punchline": "To get to the other side.",
                "type": "General"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "queued");

    let queued = broker.queued(SUBMITTED_QUEUE);
    assert_eq!(queued.len(), 1);
    let message = JokePayload::from_bytes(&queued[0]).unwrap();
    assert_eq!(message.setup, "Why did the chicken cross the road?");
    assert_eq!(message.punchline, "To get to the other side.");
    assert_eq!(message.joke_type, "general");
    assert!(message.timestamp > 0);
}

#[tokio::test]
async fn test_submit_missing_punchline_rejected() {
    let (app, broker, _cache, _dir) = setup_app().await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/submit",
            json!({"setup": "Knock knock", "type": "knock-knock"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("punchline"));
    assert_eq!(broker.depth(SUBMITTED_QUEUE), 0);
}

#[tokio::test]
async fn test_submit_blank_fields_rejected() {
    let (app, broker, _cache, _dir) = setup_app().await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/submit",
            json!({"setup": "  ", "punchline": "A", "type": ""}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(broker.depth(SUBMITTED_QUEUE), 0);
}

#[tokio::test]
async fn test_submit_malformed_json_rejected() {
    let (app, broker, _cache, _dir) = setup_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/submit")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "error");
    assert_eq!(broker.depth(SUBMITTED_QUEUE), 0);
}

#[tokio::test]
async fn test_submit_broker_down_is_503() {
    let (app, broker, _cache, _dir) = setup_app().await;
    broker.set_connected(false);

    let response = app
        .oneshot(json_request(
            "POST",
            "/submit",
            json!({"setup": "Q", "punchline": "A", "type": "dad"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "error");
}

// =============================================================================
// GET /types
// =============================================================================

#[tokio::test]
async fn test_types_served_from_cache() {
    let (app, _broker, cache, _dir) = setup_app().await;

    let response = app
        .clone()
        .oneshot(test_request("GET", "/types"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body, json!(DEFAULT_TYPES));

    cache.replace(vec!["dad".into(), "newcat".into()]).await.unwrap();

    let response = app.oneshot(test_request("GET", "/types")).await.unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body, json!(["dad", "newcat"]));
}

#[tokio::test]
async fn test_types_available_while_broker_down() {
    let (app, broker, _cache, _dir) = setup_app().await;
    broker.set_connected(false);

    let response = app.oneshot(test_request("GET", "/types")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (app, broker, _cache, _dir) = setup_app().await;

    let response = app
        .clone()
        .oneshot(test_request("GET", "/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "submit");
    assert!(body["version"].is_string());
    assert!(body["git_hash"].is_string());
    assert_eq!(body["broker"], "connected");
    assert_eq!(body["cached_types"], DEFAULT_TYPES.len());

    broker.set_connected(false);
    let response = app.oneshot(test_request("GET", "/health")).await.unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["broker"], "disconnected");
}

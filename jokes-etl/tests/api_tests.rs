//! Integration tests for jokes-etl query endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use jokes_common::broker::{MemoryBroker, Topology};
use jokes_common::store::{JokeStore, SqlStore};
use jokes_etl::{build_router, AppState};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

/// Test helper: app over a seeded SQLite store
async fn setup_app() -> (axum::Router, TempDir) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("jokes.db").display());
    let store = Arc::new(SqlStore::connect(&url).await.unwrap());

    store.insert_type("programming").await.unwrap();
    store.insert_type("rare-type").await.unwrap();
    for i in 0..4 {
        store
            .insert_joke("programming", &format!("setup {}", i), "punchline")
            .await
            .unwrap();
    }
    store.insert_joke("rare-type", "Only one", "Of these").await.unwrap();

    let broker = MemoryBroker::new(&Topology::pipeline(None));
    let app = build_router(AppState::new(store, Arc::new(broker)));
    (app, dir)
}

fn test_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
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
// GET /types
// =============================================================================

#[tokio::test]
async fn test_types_from_store() {
    let (app, _dir) = setup_app().await;

    let response = app.oneshot(test_request("/types")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body, serde_json::json!(["programming", "rare-type"]));
}

// =============================================================================
// GET /joke/:type
// =============================================================================

#[tokio::test]
async fn test_joke_defaults_to_one() {
    let (app, _dir) = setup_app().await;

    let response = app.oneshot(test_request("/joke/programming")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    let jokes = body.as_array().unwrap();
    assert_eq!(jokes.len(), 1);
    assert_eq!(jokes[0]["type"], "programming");
    assert!(jokes[0]["createdAt"].is_string());
}

#[tokio::test]
async fn test_joke_rare_type_returns_what_exists() {
    let (app, _dir) = setup_app().await;

    let response = app
        .oneshot(test_request("/joke/Rare-Type?count=3"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    let jokes = body.as_array().unwrap();
    assert_eq!(jokes.len(), 1);
    assert_eq!(jokes[0]["setup"], "Only one");
    assert_eq!(jokes[0]["punchline"], "Of these");
}

#[tokio::test]
async fn test_joke_any_spans_types() {
    let (app, _dir) = setup_app().await;

    let response = app.oneshot(test_request("/joke/any?count=100")).await.unwrap();

    let body = extract_json(response.into_body()).await;
    assert_eq!(body.as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_joke_unknown_type_is_empty() {
    let (app, _dir) = setup_app().await;

    let response = app.oneshot(test_request("/joke/nonexistent")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_joke_count_out_of_range() {
    let (app, _dir) = setup_app().await;

    for uri in [
        "/joke/any?count=0",
        "/joke/any?count=101",
        "/joke/any?count=-1",
        "/joke/any?count=many",
    ] {
        let response = app.clone().oneshot(test_request(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let body = extract_json(response.into_body()).await;
        assert_eq!(body["status"], "error");
    }
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_reports_store() {
    let (app, _dir) = setup_app().await;

    let response = app.oneshot(test_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "etl");
    assert_eq!(body["store"], "sql");
    assert_eq!(body["broker"], "connected");
    assert!(body.get("cached_types").is_none());
}

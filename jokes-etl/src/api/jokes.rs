//! Query endpoints, served straight from the store
//!
//! - GET /types: every known type, ascending
//! - GET /joke/:type?count=N: up to N random jokes of a type, or of any type

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use jokes_common::store::{JokeRecord, TypeFilter};
use jokes_common::{Error, Result};
use serde::Deserialize;

use crate::AppState;

/// Largest `count` accepted by `/joke/:type`
pub const MAX_COUNT: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct SampleQuery {
    pub count: Option<u32>,
}

/// GET /types
pub async fn list_types(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.store.list_distinct_types().await?))
}

/// GET /joke/:type?count=N
///
/// `type` is a type name or `any`. `count` defaults to 1 and must be within
/// `1..=100`. Fewer jokes than requested is a normal answer.
pub async fn sample_jokes(
    State(state): State<AppState>,
    Path(joke_type): Path<String>,
    query: std::result::Result<Query<SampleQuery>, QueryRejection>,
) -> Result<Json<Vec<JokeRecord>>> {
    let Query(query) = query.map_err(|rejection| Error::Validation(rejection.body_text()))?;
    let count = query.count.unwrap_or(1);
    if !(1..=MAX_COUNT).contains(&count) {
        return Err(Error::Validation(format!(
            "count must be between 1 and {}, got {}",
            MAX_COUNT, count
        )));
    }

    let filter = TypeFilter::parse(&joke_type);
    Ok(Json(state.store.sample(&filter, count).await?))
}

pub fn joke_routes() -> Router<AppState> {
    Router::new()
        .route("/types", get(list_types))
        .route("/joke/:type", get(sample_jokes))
}

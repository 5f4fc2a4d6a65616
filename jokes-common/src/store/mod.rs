//! Joke store contract and backend factory
//!
//! Two interchangeable backends implement [`JokeStore`]:
//! - [`MongoStore`]: document store, random sampling via `$sample`
//! - [`SqlStore`]: relational store, random sampling via `ORDER BY RANDOM()`
//!
//! The backend is picked once by [`connect_store`]; call sites only ever see
//! `Arc<dyn JokeStore>`. Switching backends means restarting the process.

use crate::config::{StoreBackend, StoreSettings};
use crate::messages::normalize_type;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub mod mongo;
pub mod sql;

pub use mongo::MongoStore;
pub use sql::SqlStore;

/// A persisted joke; identical JSON shape for both backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JokeRecord {
    #[serde(rename = "type")]
    pub joke_type: String,
    pub setup: String,
    pub punchline: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Which jokes `sample` draws from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeFilter {
    Any,
    Named(String),
}

impl TypeFilter {
    /// `"any"` (any case) selects every type; anything else is a type name
    pub fn parse(raw: &str) -> Self {
        let name = normalize_type(raw);
        if name == "any" {
            TypeFilter::Any
        } else {
            TypeFilter::Named(name)
        }
    }
}

/// Persistence contract shared by both backends
///
/// Type names passed in are expected to be normalized already; backends
/// normalize again so the invariant holds even for direct callers.
#[async_trait]
pub trait JokeStore: Send + Sync {
    /// Insert-or-ignore a type; `true` only when this call created it
    async fn insert_type(&self, name: &str) -> Result<bool>;

    /// Insert a joke under an existing type
    async fn insert_joke(&self, joke_type: &str, setup: &str, punchline: &str) -> Result<()>;

    /// Create the type if needed and insert the joke under it
    ///
    /// Returns `true` when this call created the type. On error the relational
    /// backend leaves neither row behind; the document backend may keep the
    /// type, since it has no multi-document transaction to undo it with.
    async fn record_joke(&self, joke_type: &str, setup: &str, punchline: &str) -> Result<bool>;

    /// Every known type name, ascending
    async fn list_distinct_types(&self) -> Result<Vec<String>>;

    /// Up to `count` random jokes; fewer if not enough exist
    async fn sample(&self, filter: &TypeFilter, count: u32) -> Result<Vec<JokeRecord>>;

    /// Cheap round-trip to check the store is reachable
    async fn ping(&self) -> Result<()>;

    /// Backend name for logs and health output
    fn backend(&self) -> StoreBackend;
}

/// Connect the configured backend and prepare its schema / indexes
pub async fn connect_store(settings: &StoreSettings) -> Result<Arc<dyn JokeStore>> {
    let store: Arc<dyn JokeStore> = match settings.backend {
        StoreBackend::Mongo => {
            Arc::new(MongoStore::connect(&settings.mongo_url, &settings.mongo_database).await?)
        }
        StoreBackend::Sql => Arc::new(SqlStore::connect(&settings.sql_url).await?),
    };
    info!("Store backend ready: {}", store.backend());
    Ok(store)
}

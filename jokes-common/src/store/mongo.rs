//! Document backend (MongoDB)
//!
//! Collections:
//! - `types`: `{name}` with a unique index on `name`
//! - `jokes`: `{type, setup, punchline, created_at}`

use super::{JokeRecord, JokeStore, TypeFilter};
use crate::config::StoreBackend;
use crate::messages::normalize_type;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc, DateTime as BsonDateTime, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use serde::Deserialize;
use tracing::{debug, info};

const DUPLICATE_KEY: i32 = 11000;

pub struct MongoStore {
    db: Database,
    types: Collection<Document>,
    jokes: Collection<Document>,
}

#[derive(Debug, Deserialize)]
struct JokeDocument {
    #[serde(rename = "type")]
    joke_type: String,
    setup: String,
    punchline: String,
    created_at: BsonDateTime,
}

impl From<JokeDocument> for JokeRecord {
    fn from(doc: JokeDocument) -> Self {
        JokeRecord {
            joke_type: doc.joke_type,
            setup: doc.setup,
            punchline: doc.punchline,
            created_at: DateTime::<Utc>::from_timestamp_millis(doc.created_at.timestamp_millis())
                .unwrap_or_default(),
        }
    }
}

impl MongoStore {
    /// Connect and ensure the unique index on `types.name`
    pub async fn connect(url: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(url).await?;
        let db = client.database(database);
        let store = Self {
            types: db.collection("types"),
            jokes: db.collection("jokes"),
            db,
        };

        let unique_name = IndexModel::builder()
            .keys(doc! { "name": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        store.types.create_index(unique_name).await?;

        let by_type = IndexModel::builder().keys(doc! { "type": 1 }).build();
        store.jokes.create_index(by_type).await?;

        info!("Opened document store: database '{}'", database);
        Ok(store)
    }

    async fn add_joke(&self, name: &str, setup: &str, punchline: &str) -> Result<()> {
        self.jokes
            .insert_one(doc! {
                "type": name,
                "setup": setup,
                "punchline": punchline,
                "created_at": BsonDateTime::now(),
            })
            .await?;
        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

#[async_trait]
impl JokeStore for MongoStore {
    async fn insert_type(&self, name: &str) -> Result<bool> {
        let name = normalize_type(name);
        let result = self
            .types
            .update_one(
                doc! { "name": &name },
                doc! { "$setOnInsert": { "name": &name } },
            )
            .upsert(true)
            .await;

        let created = match result {
            Ok(update) => update.upserted_id.is_some(),
            // Two upserts racing on the same name: the loser hits the unique index
            Err(e) if is_duplicate_key(&e) => false,
            Err(e) => return Err(e.into()),
        };
        debug!("insert_type '{}': created={}", name, created);
        Ok(created)
    }

    async fn insert_joke(&self, joke_type: &str, setup: &str, punchline: &str) -> Result<()> {
        let name = normalize_type(joke_type);
        if self.types.find_one(doc! { "name": &name }).await?.is_none() {
            return Err(Error::Store(format!("unknown joke type '{}'", name)));
        }
        self.add_joke(&name, setup, punchline).await
    }

    async fn record_joke(&self, joke_type: &str, setup: &str, punchline: &str) -> Result<bool> {
        // Standalone servers have no multi-document transactions. A failed joke
        // insert leaves the type behind; the ETL re-broadcasts on redelivery.
        let name = normalize_type(joke_type);
        let created = self.insert_type(&name).await?;
        self.add_joke(&name, setup, punchline).await?;
        Ok(created)
    }

    async fn list_distinct_types(&self) -> Result<Vec<String>> {
        let docs: Vec<Document> = self
            .types
            .find(doc! {})
            .sort(doc! { "name": 1 })
            .await?
            .try_collect()
            .await?;

        docs.iter()
            .map(|d| {
                d.get_str("name")
                    .map(str::to_string)
                    .map_err(|e| Error::Store(format!("type document without name: {}", e)))
            })
            .collect()
    }

    async fn sample(&self, filter: &TypeFilter, count: u32) -> Result<Vec<JokeRecord>> {
        let mut pipeline = Vec::with_capacity(2);
        if let TypeFilter::Named(name) = filter {
            pipeline.push(doc! { "$match": { "type": normalize_type(name) } });
        }
        pipeline.push(doc! { "$sample": { "size": i64::from(count) } });

        let mut cursor = self.jokes.aggregate(pipeline).await?;
        let mut records = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            let joke: JokeDocument = bson::from_document(document)
                .map_err(|e| Error::Store(format!("malformed joke document: {}", e)))?;
            records.push(joke.into());
        }
        Ok(records)
    }

    async fn ping(&self) -> Result<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Mongo
    }
}

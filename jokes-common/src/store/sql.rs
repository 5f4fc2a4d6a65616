//! Relational backend (sqlx / SQLite)
//!
//! Schema:
//! - `types(id, name UNIQUE)`
//! - `jokes(id, type_id -> types.id, setup, punchline, created_at)`
//!
//! Tables are created idempotently on connect.

use super::{JokeRecord, JokeStore, TypeFilter};
use crate::config::StoreBackend;
use crate::messages::normalize_type;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

pub struct SqlStore {
    pool: SqlitePool,
}

impl SqlStore {
    /// Open (creating if missing) the database at `url` and ensure the schema
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;
        info!("Opened relational store: {}", url);

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and ensure the schema
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        create_schema(&pool).await?;
        Ok(Self { pool })
    }
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jokes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            type_id INTEGER NOT NULL REFERENCES types(id),
            setup TEXT NOT NULL,
            punchline TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jokes_type_id ON jokes(type_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Insert-or-ignore `name` on any executor; `true` when a row was added
async fn upsert_type<'e, E>(executor: E, name: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    // The UNIQUE constraint settles concurrent inserts from other workers
    let result = sqlx::query("INSERT INTO types (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
        .bind(name)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() == 1)
}

async fn add_joke<'e, E>(executor: E, name: &str, setup: &str, punchline: &str) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO jokes (type_id, setup, punchline, created_at)
        SELECT id, ?, ?, ? FROM types WHERE name = ?
        "#,
    )
    .bind(setup)
    .bind(punchline)
    .bind(Utc::now())
    .bind(name)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::Store(format!("unknown joke type '{}'", name)));
    }
    Ok(())
}

#[async_trait]
impl JokeStore for SqlStore {
    async fn insert_type(&self, name: &str) -> Result<bool> {
        let name = normalize_type(name);
        let created = upsert_type(&self.pool, &name).await?;
        debug!("insert_type '{}': created={}", name, created);
        Ok(created)
    }

    async fn insert_joke(&self, joke_type: &str, setup: &str, punchline: &str) -> Result<()> {
        add_joke(&self.pool, &normalize_type(joke_type), setup, punchline).await
    }

    async fn record_joke(&self, joke_type: &str, setup: &str, punchline: &str) -> Result<bool> {
        let name = normalize_type(joke_type);
        // Dropping the transaction on error rolls the type back too
        let mut tx = self.pool.begin().await?;
        let created = upsert_type(&mut *tx, &name).await?;
        add_joke(&mut *tx, &name, setup, punchline).await?;
        tx.commit().await?;
        debug!("record_joke '{}': created={}", name, created);
        Ok(created)
    }

    async fn list_distinct_types(&self) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>("SELECT name FROM types ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    async fn sample(&self, filter: &TypeFilter, count: u32) -> Result<Vec<JokeRecord>> {
        let rows = match filter {
            TypeFilter::Any => {
                sqlx::query(
                    r#"
                    SELECT t.name AS joke_type, j.setup, j.punchline, j.created_at
                    FROM jokes j JOIN types t ON t.id = j.type_id
                    ORDER BY RANDOM() LIMIT ?
                    "#,
                )
                .bind(i64::from(count))
                .fetch_all(&self.pool)
                .await?
            }
            TypeFilter::Named(name) => {
                sqlx::query(
                    r#"
                    SELECT t.name AS joke_type, j.setup, j.punchline, j.created_at
                    FROM jokes j JOIN types t ON t.id = j.type_id
                    WHERE t.name = ?
                    ORDER BY RANDOM() LIMIT ?
                    "#,
                )
                .bind(normalize_type(name))
                .bind(i64::from(count))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter()
            .map(|row| -> Result<JokeRecord> {
                Ok(JokeRecord {
                    joke_type: row.try_get("joke_type")?,
                    setup: row.try_get("setup")?,
                    punchline: row.try_get("punchline")?,
                    created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
                })
            })
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Sql
    }
}

//! Postgres store backend.
//!
//! Each collection is one `(id TEXT PRIMARY KEY, doc JSONB)` table. Equality
//! filters map to JSONB containment; patches are applied read-modify-write
//! inside a transaction so dotted paths land atomically. Every operation is
//! bounded by a per-call timeout so a hung backend cannot pin request
//! workers.

use super::{apply_patch, collections, Document, EntityId, Store, StoreError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info_span, Instrument};

const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct PgStore {
    pool: PgPool,
    op_timeout: Duration,
}

impl PgStore {
    /// Connect to the database and wrap the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be established.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;

        Ok(Self::from_pool(pool))
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    /// Create the collection tables when they do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if a table cannot be created.
    pub async fn ensure_collections(&self) -> Result<()> {
        for name in collections::ALL {
            let query =
                format!("CREATE TABLE IF NOT EXISTS {name} (id TEXT PRIMARY KEY, doc JSONB NOT NULL)");
            sqlx::query(&query)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to create collection table {name}"))?;
        }
        Ok(())
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match timeout(self.op_timeout, fut).await {
            Err(_) => Err(StoreError::Timeout),
            Ok(Err(err)) => Err(StoreError::backend(err)),
            Ok(Ok(value)) => Ok(value),
        }
    }
}

/// Collection names are interpolated into SQL; only the fixed identifiers
/// this crate defines are accepted.
fn table(collection: &str) -> Result<&str, StoreError> {
    if collections::ALL.contains(&collection) {
        Ok(collection)
    } else {
        Err(StoreError::backend(anyhow::anyhow!(
            "unknown collection: {collection}"
        )))
    }
}

fn doc_from_row(row: &sqlx::postgres::PgRow) -> Result<Document, sqlx::Error> {
    let value: Value = row.try_get("doc")?;
    match value {
        Value::Object(doc) => Ok(doc),
        other => Err(sqlx::Error::Decode(
            format!("expected a JSON object document, got {other}").into(),
        )),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Document,
    ) -> Result<Option<Document>, StoreError> {
        let table = table(collection)?;
        let query = format!("SELECT doc FROM {table} WHERE doc @> $1::jsonb ORDER BY id LIMIT 1");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );

        let row = self
            .timed(
                sqlx::query(&query)
                    .bind(Value::Object(filter.clone()))
                    .fetch_optional(&self.pool)
                    .instrument(span),
            )
            .await?;

        row.map(|row| doc_from_row(&row))
            .transpose()
            .map_err(StoreError::backend)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Document,
    ) -> Result<Vec<Document>, StoreError> {
        let table = table(collection)?;
        let query = format!("SELECT doc FROM {table} WHERE doc @> $1::jsonb ORDER BY id");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );

        let rows = self
            .timed(
                sqlx::query(&query)
                    .bind(Value::Object(filter.clone()))
                    .fetch_all(&self.pool)
                    .instrument(span),
            )
            .await?;

        rows.iter()
            .map(doc_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::backend)
    }

    async fn insert_one(
        &self,
        collection: &str,
        mut document: Document,
    ) -> Result<EntityId, StoreError> {
        let table = table(collection)?;
        let id = match document.get("_id") {
            Some(Value::String(raw)) => EntityId::from_str(raw)
                .map_err(|_| StoreError::backend(anyhow::anyhow!("malformed _id: {raw}")))?,
            Some(other) => {
                return Err(StoreError::backend(anyhow::anyhow!(
                    "malformed _id: {other}"
                )))
            }
            None => {
                let id = EntityId::generate();
                document.insert("_id".to_string(), Value::from(&id));
                id
            }
        };

        let query = format!("INSERT INTO {table} (id, doc) VALUES ($1, $2::jsonb)");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = %query
        );

        self.timed(
            sqlx::query(&query)
                .bind(id.as_str())
                .bind(Value::Object(document))
                .execute(&self.pool)
                .instrument(span),
        )
        .await?;

        Ok(id)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        patch: &Document,
    ) -> Result<u64, StoreError> {
        let table = table(collection)?;
        let select =
            format!("SELECT id, doc FROM {table} WHERE doc @> $1::jsonb ORDER BY id LIMIT 1 FOR UPDATE");
        let update = format!("UPDATE {table} SET doc = $2::jsonb WHERE id = $1");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = %update
        );

        let op = async {
            let mut tx = self.pool.begin().await?;

            let Some(row) = sqlx::query(&select)
                .bind(Value::Object(filter.clone()))
                .fetch_optional(&mut *tx)
                .await?
            else {
                return Ok(0);
            };

            let id: String = row.try_get("id")?;
            let mut doc = doc_from_row(&row)?;
            apply_patch(&mut doc, patch);

            sqlx::query(&update)
                .bind(&id)
                .bind(Value::Object(doc))
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            Ok::<u64, sqlx::Error>(1)
        };

        self.timed(op.instrument(span)).await
    }

    async fn delete_one(&self, collection: &str, filter: &Document) -> Result<u64, StoreError> {
        let table = table(collection)?;
        let query = format!(
            "DELETE FROM {table} WHERE id = \
             (SELECT id FROM {table} WHERE doc @> $1::jsonb ORDER BY id LIMIT 1)"
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = %query
        );

        let result = self
            .timed(
                sqlx::query(&query)
                    .bind(Value::Object(filter.clone()))
                    .execute(&self.pool)
                    .instrument(span),
            )
            .await?;

        Ok(result.rows_affected())
    }
}

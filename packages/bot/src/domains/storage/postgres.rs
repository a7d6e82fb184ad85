//! Postgres-backed dedup store.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::{DocumentStore, ProcessedRecord, StoreError};
use crate::domains::documents::Document;

const TABLE: &str = "processed_documents";
const LEGACY_CONSTRAINT: &str = "processed_documents_url_key";
const KEY_CONSTRAINT: &str = "processed_documents_title_url_key";

pub struct PostgresStore {
    options: PgConnectOptions,
    pool: RwLock<PgPool>,
    // Serializes reconnects so concurrent callers build one pool at a time
    reconnecting: Mutex<()>,
}

impl PostgresStore {
    /// Connect, verify the connection and bring the schema up to date.
    pub async fn connect(options: PgConnectOptions) -> Result<Self, StoreError> {
        let pool = open_pool(&options).await?;
        let store = Self {
            options,
            pool: RwLock::new(pool),
            reconnecting: Mutex::new(()),
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Current pool handle. Cheap to clone.
    pub async fn pool(&self) -> PgPool {
        self.pool.read().await.clone()
    }

    /// Create the table, or migrate the legacy url-only unique constraint to
    /// the composite `(title, url)` key. Safe to run repeatedly.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let pool = self.pool().await;

        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(TABLE)
            .fetch_one(&pool)
            .await?;

        if !exists {
            info!(table = TABLE, "Creating table");
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS processed_documents (
                    id SERIAL PRIMARY KEY,
                    title TEXT NOT NULL,
                    url TEXT NOT NULL,
                    timestamp TIMESTAMPTZ NOT NULL,
                    CONSTRAINT processed_documents_title_url_key UNIQUE (title, url)
                )",
            )
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Migration(format!("failed to create table: {e}")))?;
            return Ok(());
        }

        if !constraint_exists(&pool, LEGACY_CONSTRAINT).await? {
            debug!("Schema is up to date");
            return Ok(());
        }

        info!(
            from = LEGACY_CONSTRAINT,
            to = KEY_CONSTRAINT,
            "Migrating unique constraint"
        );
        let mut tx = pool.begin().await?;

        sqlx::query("ALTER TABLE processed_documents DROP CONSTRAINT processed_documents_url_key")
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Migration(format!("failed to drop legacy constraint: {e}")))?;

        let has_key: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM pg_constraint
                WHERE conname = $1 AND conrelid = 'processed_documents'::regclass
            )",
        )
        .bind(KEY_CONSTRAINT)
        .fetch_one(&mut *tx)
        .await?;

        if !has_key {
            sqlx::query(
                "ALTER TABLE processed_documents
                 ADD CONSTRAINT processed_documents_title_url_key UNIQUE (title, url)",
            )
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Migration(format!("failed to add composite key: {e}")))?;
        }

        tx.commit().await?;
        info!("Unique constraint migrated");
        Ok(())
    }

    /// Look up the record for a key.
    pub async fn find(&self, title: &str, url: &str) -> Result<Option<ProcessedRecord>, StoreError> {
        let pool = self.pool().await;
        let record = sqlx::query_as::<_, ProcessedRecord>(
            "SELECT title, url, timestamp FROM processed_documents WHERE title = $1 AND url = $2",
        )
        .bind(title)
        .bind(url)
        .fetch_optional(&pool)
        .await?;
        Ok(record)
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn is_processed(&self, doc: &Document) -> bool {
        let pool = self.pool().await;
        let result: Result<bool, sqlx::Error> = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM processed_documents WHERE title = $1 AND url = $2)",
        )
        .bind(&doc.title)
        .bind(&doc.url)
        .fetch_one(&pool)
        .await;

        match result {
            Ok(processed) => processed,
            Err(e) => {
                error!(title = %doc.title, error = %e, "Error checking if document is processed");
                false
            }
        }
    }

    async fn mark_processed(&self, record: &ProcessedRecord) -> Result<(), StoreError> {
        let pool = self.pool().await;

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM processed_documents WHERE title = $1 AND url = $2)",
        )
        .bind(&record.title)
        .bind(&record.url)
        .fetch_one(&pool)
        .await?;

        if exists {
            debug!(title = %record.title, "Document already marked as processed");
            return Ok(());
        }

        sqlx::query(
            "INSERT INTO processed_documents (title, url, timestamp)
             VALUES ($1, $2, $3)
             ON CONFLICT DO NOTHING",
        )
        .bind(&record.title)
        .bind(&record.url)
        .bind(record.timestamp)
        .execute(&pool)
        .await?;

        debug!(title = %record.title, "Document marked as processed");
        Ok(())
    }

    async fn check_connection(&self) -> Result<(), StoreError> {
        let pool = self.pool().await;
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map(|_| ())
            .map_err(StoreError::Connection)
    }

    async fn reconnect(&self) -> Result<(), StoreError> {
        let _guard = self.reconnecting.lock().await;
        info!("Reconnecting to database");

        let fresh = open_pool(&self.options).await?;
        let old = {
            let mut current = self.pool.write().await;
            std::mem::replace(&mut *current, fresh)
        };
        old.close().await;

        info!("Database connection re-established");
        Ok(())
    }

    async fn close(&self) {
        self.pool.read().await.close().await;
    }
}

async fn open_pool(options: &PgConnectOptions) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .max_lifetime(Duration::from_secs(5 * 60))
        .connect_with(options.clone())
        .await
        .map_err(StoreError::Connection)?;

    if let Err(e) = sqlx::query("SELECT 1").execute(&pool).await {
        warn!(error = %e, "New database pool failed its first query");
        pool.close().await;
        return Err(StoreError::Connection(e));
    }
    Ok(pool)
}

async fn constraint_exists(pool: &PgPool, name: &str) -> Result<bool, StoreError> {
    let exists = sqlx::query_scalar(
        "SELECT EXISTS (
            SELECT 1 FROM pg_constraint
            WHERE conname = $1 AND conrelid = 'processed_documents'::regclass
        )",
    )
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

//! File persistence.
//!
//! Rows are stored as opaque JSON documents tagged with their sheet; the
//! store never looks inside them. Row documents live in a `json` column and
//! travel as text so their keys keep the source column order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ingest::{DataRow, NewFileRecord, SheetHeaders, TaggedRow};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("file {0} not found")]
    NotFound(String),

    #[error("row encoding error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A persisted file with its bookkeeping timestamps.
#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub record: NewFileRecord,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Short name shown by the health check.
    fn kind(&self) -> &'static str;

    /// Store a new file and its rows; returns the new file id.
    async fn create(&self, record: &NewFileRecord) -> Result<String, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<StoredFile>, StoreError>;

    /// Overwrite the metadata and every row of an existing file.
    async fn replace(&self, id: &str, record: &NewFileRecord) -> Result<(), StoreError>;

    /// Returns false when there was nothing to delete.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

// ============================================================================
// Memory
// ============================================================================

#[derive(Default)]
pub struct MemoryFileStore {
    files: RwLock<HashMap<String, StoredFile>>,
}

#[async_trait]
impl FileStore for MemoryFileStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, record: &NewFileRecord) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        self.files.write().await.insert(
            id.clone(),
            StoredFile {
                id: id.clone(),
                created_at: now,
                updated_at: now,
                record: record.clone(),
            },
        );
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<StoredFile>, StoreError> {
        Ok(self.files.read().await.get(id).cloned())
    }

    async fn replace(&self, id: &str, record: &NewFileRecord) -> Result<(), StoreError> {
        let mut files = self.files.write().await;
        let stored = files
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        stored.record = record.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.files.write().await.remove(id).is_some())
    }
}

// ============================================================================
// Postgres
// ============================================================================

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS files (
        file_id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        size_bytes BIGINT NOT NULL,
        sheets JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS file_rows (
        file_id UUID NOT NULL REFERENCES files(file_id) ON DELETE CASCADE,
        position INT NOT NULL,
        sheet TEXT NOT NULL,
        data JSON NOT NULL,
        PRIMARY KEY (file_id, position)
    )
    "#,
    // Tables created before rows kept their column order used jsonb.
    "ALTER TABLE file_rows ALTER COLUMN data TYPE JSON USING data::json",
];

pub struct PgFileStore {
    pool: PgPool,
}

type FileRow = (String, i64, Json<Vec<SheetHeaders>>, DateTime<Utc>, DateTime<Utc>);

impl PgFileStore {
    /// Connect and create the tables if they do not exist yet.
    pub async fn connect(db_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(db_url)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        Ok(Self { pool })
    }

    async fn insert_rows(
        tx: &mut Transaction<'_, Postgres>,
        file_id: Uuid,
        rows: &[TaggedRow],
    ) -> Result<(), StoreError> {
        for (position, row) in rows.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO file_rows (file_id, position, sheet, data)
                VALUES ($1, $2, $3, $4::json)
                "#,
            )
            .bind(file_id)
            .bind(position as i32)
            .bind(&row.sheet)
            .bind(encode_row(&row.data)?)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

fn size_bytes(record: &NewFileRecord) -> i64 {
    i64::try_from(record.size).unwrap_or(i64::MAX)
}

/// jsonb reorders object keys, so rows are written as JSON text.
fn encode_row(data: &DataRow) -> Result<String, serde_json::Error> {
    serde_json::to_string(data)
}

fn decode_row(text: &str) -> Result<DataRow, serde_json::Error> {
    serde_json::from_str(text)
}

#[async_trait]
impl FileStore for PgFileStore {
    fn kind(&self) -> &'static str {
        "postgres"
    }

    async fn create(&self, record: &NewFileRecord) -> Result<String, StoreError> {
        let file_id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO files (file_id, name, size_bytes, sheets)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(file_id)
        .bind(&record.name)
        .bind(size_bytes(record))
        .bind(Json(&record.sheets))
        .execute(&mut *tx)
        .await?;

        Self::insert_rows(&mut tx, file_id, &record.rows).await?;
        tx.commit().await?;

        tracing::info!(%file_id, rows = record.rows.len(), "file stored");
        Ok(file_id.to_string())
    }

    async fn get(&self, id: &str) -> Result<Option<StoredFile>, StoreError> {
        let Ok(file_id) = Uuid::parse_str(id) else {
            return Ok(None);
        };

        let file: Option<FileRow> = sqlx::query_as(
            r#"
            SELECT name, size_bytes, sheets, created_at, updated_at
            FROM files WHERE file_id = $1
            "#,
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((name, size, Json(sheets), created_at, updated_at)) = file else {
            return Ok(None);
        };

        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT sheet, data::text FROM file_rows WHERE file_id = $1 ORDER BY position",
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;

        let rows = rows
            .into_iter()
            .map(|(sheet, data)| Ok(TaggedRow { sheet, data: decode_row(&data)? }))
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(Some(StoredFile {
            id: id.to_string(),
            created_at,
            updated_at,
            record: NewFileRecord {
                name,
                size: u64::try_from(size).unwrap_or(0),
                sheets,
                rows,
            },
        }))
    }

    async fn replace(&self, id: &str, record: &NewFileRecord) -> Result<(), StoreError> {
        let file_id = Uuid::parse_str(id).map_err(|_| StoreError::NotFound(id.to_string()))?;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE files
            SET name = $2, size_bytes = $3, sheets = $4, updated_at = now()
            WHERE file_id = $1
            "#,
        )
        .bind(file_id)
        .bind(&record.name)
        .bind(size_bytes(record))
        .bind(Json(&record.sheets))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }

        sqlx::query("DELETE FROM file_rows WHERE file_id = $1")
            .bind(file_id)
            .execute(&mut *tx)
            .await?;
        Self::insert_rows(&mut tx, file_id, &record.rows).await?;
        tx.commit().await?;

        tracing::info!(%file_id, rows = record.rows.len(), "file rows replaced");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let Ok(file_id) = Uuid::parse_str(id) else {
            return Ok(false);
        };

        let deleted = sqlx::query("DELETE FROM files WHERE file_id = $1")
            .bind(file_id)
            .execute(&self.pool)
            .await?;

        Ok(deleted.rows_affected() > 0)
    }
}

//! SQLite-backed [`VectorIndex`].
//!
//! One row per chunk, with the owning document's metadata denormalized
//! onto it, plus a `chunk_vectors` table holding embedding BLOBs
//! (little-endian f32, see [`crate::embedding::vec_to_blob`]).

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::index::{IndexStats, VectorIndex};
use crate::models::{ChunkRecord, DocumentMetadata, PositionRange};

pub struct SqliteIndex {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteIndex {
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    /// Create the schema. Idempotent; `csync init` runs this.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                document_id TEXT,
                document_name TEXT NOT NULL,
                text TEXT NOT NULL,
                start_line INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset INTEGER NOT NULL,
                doc_modified_at INTEGER,
                last_synced_at INTEGER,
                content_version INTEGER,
                content_digest TEXT,
                size_bytes INTEGER,
                folder_path TEXT,
                web_link TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunk_vectors (
                chunk_id TEXT PRIMARY KEY,
                embedding BLOB NOT NULL,
                FOREIGN KEY (chunk_id) REFERENCES chunks(chunk_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunks_document_name ON chunks(document_name)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn ts_opt(dt: Option<DateTime<Utc>>) -> Option<i64> {
    dt.map(|d| d.timestamp())
}

fn dt_opt(ts: Option<i64>) -> Option<DateTime<Utc>> {
    ts.and_then(|t| DateTime::from_timestamp(t, 0))
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn scan(&self) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT chunk_id, document_id, document_name, text,
                   start_line, end_line, start_offset, end_offset,
                   doc_modified_at, last_synced_at, content_version,
                   content_digest, size_bytes, folder_path, web_link
            FROM chunks
            ORDER BY document_name, start_offset
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(ChunkRecord {
                chunk_id: row.get("chunk_id"),
                document_id: row.get("document_id"),
                document_name: row.get("document_name"),
                text: row.get("text"),
                position: PositionRange {
                    start_line: row.get::<i64, _>("start_line") as u32,
                    end_line: row.get::<i64, _>("end_line") as u32,
                    start_offset: row.get::<i64, _>("start_offset") as usize,
                    end_offset: row.get::<i64, _>("end_offset") as usize,
                },
                metadata: DocumentMetadata {
                    modified_at: dt_opt(row.get("doc_modified_at")),
                    last_synced_at: dt_opt(row.get("last_synced_at")),
                    content_version: row.get("content_version"),
                    content_digest: row.get("content_digest"),
                    size_bytes: row.get::<Option<i64>, _>("size_bytes").map(|s| s as u64),
                    folder_path: row.get("folder_path"),
                    web_link: row.get("web_link"),
                },
                // Metadata-only scan; vectors stay in the store.
                vector: Vec::new(),
            });
        }

        Ok(records)
    }

    async fn upsert(&self, records: &[ChunkRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO chunks
                    (chunk_id, document_id, document_name, text,
                     start_line, end_line, start_offset, end_offset,
                     doc_modified_at, last_synced_at, content_version,
                     content_digest, size_bytes, folder_path, web_link)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.chunk_id)
            .bind(&record.document_id)
            .bind(&record.document_name)
            .bind(&record.text)
            .bind(record.position.start_line as i64)
            .bind(record.position.end_line as i64)
            .bind(record.position.start_offset as i64)
            .bind(record.position.end_offset as i64)
            .bind(ts_opt(record.metadata.modified_at))
            .bind(ts_opt(record.metadata.last_synced_at))
            .bind(record.metadata.content_version)
            .bind(&record.metadata.content_digest)
            .bind(record.metadata.size_bytes.map(|s| s as i64))
            .bind(&record.metadata.folder_path)
            .bind(&record.metadata.web_link)
            .execute(&mut *tx)
            .await?;

            if !record.vector.is_empty() {
                sqlx::query(
                    "INSERT OR REPLACE INTO chunk_vectors (chunk_id, embedding) VALUES (?, ?)",
                )
                .bind(&record.chunk_id)
                .bind(vec_to_blob(&record.vector))
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_many(&self, chunk_ids: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for chunk_id in chunk_ids {
            sqlx::query("DELETE FROM chunk_vectors WHERE chunk_id = ?")
                .bind(chunk_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM chunks WHERE chunk_id = ?")
                .bind(chunk_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn describe_stats(&self) -> Result<IndexStats> {
        let chunk_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;

        let document_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT COALESCE('id:' || document_id, 'name:' || document_name)) FROM chunks",
        )
        .fetch_one(&self.pool)
        .await?;

        let legacy_chunk_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE document_id IS NULL")
                .fetch_one(&self.pool)
                .await?;

        let index_size_bytes = std::fs::metadata(&self.path).map(|m| m.len()).ok();

        Ok(IndexStats {
            chunk_count: chunk_count as u64,
            document_count: document_count as u64,
            legacy_chunk_count: legacy_chunk_count as u64,
            index_size_bytes,
        })
    }
}

/// Fetch one stored vector, decoded.
pub async fn fetch_vector(index: &SqliteIndex, chunk_id: &str) -> Result<Option<Vec<f32>>> {
    let blob: Option<Vec<u8>> =
        sqlx::query_scalar("SELECT embedding FROM chunk_vectors WHERE chunk_id = ?")
            .bind(chunk_id)
            .fetch_optional(&index.pool)
            .await?;
    Ok(blob.map(|b| blob_to_vec(&b)))
}

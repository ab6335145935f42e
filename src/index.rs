//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait defines the only operations the engine
//! performs against the destination index, enabling pluggable backends
//! (SQLite, in-memory for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::ChunkRecord;

/// Aggregate counts for `stats` output and run summaries.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub chunk_count: u64,
    pub document_count: u64,
    /// Chunks without a stable document id (indexed before key tracking).
    pub legacy_chunk_count: u64,
    pub index_size_bytes: Option<u64>,
}

/// Abstract destination index.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`scan`](VectorIndex::scan) | Full scan of all chunk records (state loading) |
/// | [`upsert`](VectorIndex::upsert) | Write a batch of chunk records |
/// | [`delete_many`](VectorIndex::delete_many) | Remove chunk records by id |
/// | [`describe_stats`](VectorIndex::describe_stats) | Aggregate counts |
///
/// `scan` may return records with empty `vector`s; the engine only needs
/// chunk metadata to reconstruct document state.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn scan(&self) -> Result<Vec<ChunkRecord>>;

    async fn upsert(&self, records: &[ChunkRecord]) -> Result<()>;

    async fn delete_many(&self, chunk_ids: &[String]) -> Result<()>;

    async fn describe_stats(&self) -> Result<IndexStats>;
}

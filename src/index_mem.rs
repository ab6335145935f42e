//! In-memory [`VectorIndex`] implementation for tests.
//!
//! Chunk records live in a `Vec` behind `std::sync::RwLock`. Scan order
//! is insertion order, which keeps tests deterministic.

use std::collections::HashSet;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::index::{IndexStats, VectorIndex};
use crate::models::ChunkRecord;

pub struct MemoryIndex {
    chunks: RwLock<Vec<ChunkRecord>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// Seed the index directly, bypassing the driver. Test setup only.
    pub fn seed(&self, records: Vec<ChunkRecord>) {
        self.chunks.write().unwrap().extend(records);
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn scan(&self) -> Result<Vec<ChunkRecord>> {
        Ok(self.chunks.read().unwrap().clone())
    }

    async fn upsert(&self, records: &[ChunkRecord]) -> Result<()> {
        let mut chunks = self.chunks.write().unwrap();
        for record in records {
            match chunks.iter_mut().find(|c| c.chunk_id == record.chunk_id) {
                Some(existing) => *existing = record.clone(),
                None => chunks.push(record.clone()),
            }
        }
        Ok(())
    }

    async fn delete_many(&self, chunk_ids: &[String]) -> Result<()> {
        let doomed: HashSet<&str> = chunk_ids.iter().map(String::as_str).collect();
        self.chunks
            .write()
            .unwrap()
            .retain(|c| !doomed.contains(c.chunk_id.as_str()));
        Ok(())
    }

    async fn describe_stats(&self) -> Result<IndexStats> {
        let chunks = self.chunks.read().unwrap();
        let mut doc_keys = HashSet::new();
        let mut legacy = 0u64;
        for c in chunks.iter() {
            match &c.document_id {
                Some(id) => {
                    doc_keys.insert(format!("id:{}", id));
                }
                None => {
                    legacy += 1;
                    doc_keys.insert(format!("name:{}", c.document_name));
                }
            }
        }
        Ok(IndexStats {
            chunk_count: chunks.len() as u64,
            document_count: doc_keys.len() as u64,
            legacy_chunk_count: legacy,
            index_size_bytes: None,
        })
    }
}

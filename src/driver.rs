//! Indexing driver — the only stage with side effects.
//!
//! Executes the classifier's plan against the vector index: extract,
//! chunk, embed, and write for new and modified items; chunk deletion
//! for removed documents. Modified documents are handled
//! delete-before-write so no stale chunk can survive a successful
//! reindex; the cost is a transient window where a document briefly has
//! no chunks if the run dies in between.
//!
//! Every error raised here is a per-item failure: the caller records it
//! and moves on to the next item.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::config::{ChunkingConfig, SyncConfig};
use crate::embedding::Embedder;
use crate::extract::{extract_text, OcrFallback};
use crate::index::VectorIndex;
use crate::models::{ChunkRecord, DocumentMetadata, IndexedDocument, SourceItem};
use crate::repository::Repository;

/// Per-item outcome counters, accumulated into the run report.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemOutcome {
    pub chunks_written: u64,
    pub chunks_deleted: u64,
}

pub struct IndexingDriver<'a> {
    pub repository: &'a dyn Repository,
    pub index: &'a dyn VectorIndex,
    pub embedder: &'a dyn Embedder,
    pub ocr: Option<&'a dyn OcrFallback>,
    pub chunking: ChunkingConfig,
    pub sync: SyncConfig,
    pub embed_batch_size: usize,
    /// Stamped as `last_synced_at` on every chunk written this run.
    pub run_at: DateTime<Utc>,
}

impl<'a> IndexingDriver<'a> {
    /// Index a document the index has never seen.
    pub async fn process_new(&self, item: &SourceItem) -> Result<ItemOutcome> {
        let written = self.extract_and_write(item).await?;
        Ok(ItemOutcome {
            chunks_written: written,
            chunks_deleted: 0,
        })
    }

    /// Reindex a changed document. Old chunks go first, so the index can
    /// never hold both generations after a successful run.
    pub async fn process_modified(
        &self,
        item: &SourceItem,
        matched: &IndexedDocument,
    ) -> Result<ItemOutcome> {
        self.index
            .delete_many(&matched.chunk_ids)
            .await
            .with_context(|| format!("Failed to delete prior chunks of '{}'", matched.name))?;

        let written = self.extract_and_write(item).await?;
        Ok(ItemOutcome {
            chunks_written: written,
            chunks_deleted: matched.chunk_ids.len() as u64,
        })
    }

    /// Drop every chunk of a document that left the repository.
    pub async fn process_deleted(&self, doc: &IndexedDocument) -> Result<ItemOutcome> {
        self.index
            .delete_many(&doc.chunk_ids)
            .await
            .with_context(|| format!("Failed to delete chunks of '{}'", doc.name))?;
        Ok(ItemOutcome {
            chunks_written: 0,
            chunks_deleted: doc.chunk_ids.len() as u64,
        })
    }

    async fn extract_and_write(&self, item: &SourceItem) -> Result<u64> {
        let bytes = self
            .repository
            .download(item)
            .await
            .with_context(|| format!("Download failed for '{}'", item.name))?;

        let text = extract_text(&bytes, item.format, self.ocr)
            .map_err(|e| anyhow::anyhow!("Extraction failed for '{}': {}", item.name, e))?;

        let char_count = text.trim().chars().count();
        if char_count < self.sync.min_content_chars {
            bail!(
                "content too short: {} chars after extraction (minimum {})",
                char_count,
                self.sync.min_content_chars
            );
        }

        let slices = chunk_text(&text, self.chunking.max_chars, self.chunking.overlap_chars);

        let texts: Vec<String> = slices.iter().map(|s| s.text.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.embed_batch_size.max(1)) {
            let batch_vectors = self
                .embedder
                .embed(batch)
                .await
                .with_context(|| format!("Embedding failed for '{}'", item.name))?;
            if batch_vectors.len() != batch.len() {
                bail!(
                    "Embedding service returned {} vectors for {} texts",
                    batch_vectors.len(),
                    batch.len()
                );
            }
            vectors.extend(batch_vectors);
        }

        let metadata = DocumentMetadata {
            modified_at: Some(item.modified_at),
            last_synced_at: Some(self.run_at),
            content_version: item.content_version,
            content_digest: item.content_digest.clone(),
            size_bytes: item.size_bytes,
            folder_path: Some(item.folder_path.clone()),
            web_link: item.web_link.clone(),
        };

        let records: Vec<ChunkRecord> = slices
            .into_iter()
            .zip(vectors)
            .map(|(slice, vector)| ChunkRecord {
                chunk_id: Uuid::new_v4().to_string(),
                document_id: item.id.clone(),
                document_name: item.name.clone(),
                text: slice.text,
                position: slice.position,
                metadata: metadata.clone(),
                vector,
            })
            .collect();

        self.index
            .upsert(&records)
            .await
            .with_context(|| format!("Index write failed for '{}'", item.name))?;

        Ok(records.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::VectorIndex;
    use crate::index_mem::MemoryIndex;
    use crate::models::FormatTag;
    use crate::repository::RepoEntry;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct StubRepo {
        bodies: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl Repository for StubRepo {
        fn root_folder(&self) -> String {
            String::new()
        }
        async fn list(&self, _folder_id: &str) -> Result<Vec<RepoEntry>> {
            Ok(Vec::new())
        }
        async fn resolve_link(&self, _entry: &RepoEntry) -> Result<Option<RepoEntry>> {
            Ok(None)
        }
        async fn download(&self, item: &SourceItem) -> Result<Vec<u8>> {
            self.bodies
                .get(item.id.as_deref().unwrap_or_default())
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("missing body"))
        }
    }

    /// Deterministic stub: a constant-ish vector per text length.
    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn model_name(&self) -> &str {
            "stub"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0, 2.0, 3.0])
                .collect())
        }
    }

    fn item(id: &str, name: &str) -> SourceItem {
        SourceItem {
            id: Some(id.to_string()),
            name: name.to_string(),
            format: FormatTag::PlainText,
            folder_path: "docs".to_string(),
            modified_at: Utc::now(),
            created_at: Utc::now(),
            size_bytes: Some(100),
            content_version: Some(1),
            content_digest: Some("digest".to_string()),
            web_link: None,
        }
    }

    fn driver<'a>(
        repo: &'a StubRepo,
        index: &'a MemoryIndex,
        embedder: &'a StubEmbedder,
    ) -> IndexingDriver<'a> {
        IndexingDriver {
            repository: repo,
            index,
            embedder,
            ocr: None,
            chunking: ChunkingConfig {
                max_chars: 100,
                overlap_chars: 20,
            },
            sync: SyncConfig::default(),
            embed_batch_size: 8,
            run_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn new_item_writes_chunks_with_identical_metadata() {
        let body = "A meaningful paragraph of document text. ".repeat(20);
        let repo = StubRepo {
            bodies: HashMap::from([("d1".to_string(), body.into_bytes())]),
        };
        let index = MemoryIndex::new();
        let embedder = StubEmbedder;
        let d = driver(&repo, &index, &embedder);

        let outcome = d.process_new(&item("d1", "Doc.txt")).await.unwrap();
        assert!(outcome.chunks_written > 1);

        let chunks = index.scan().await.unwrap();
        assert_eq!(chunks.len() as u64, outcome.chunks_written);
        let first_meta = &chunks[0].metadata;
        for c in &chunks {
            assert_eq!(&c.metadata, first_meta);
            assert_eq!(c.document_id.as_deref(), Some("d1"));
            assert_eq!(c.metadata.last_synced_at, Some(d.run_at));
            assert_eq!(c.vector.len(), 4);
        }
    }

    #[tokio::test]
    async fn short_content_is_a_per_item_failure() {
        let repo = StubRepo {
            bodies: HashMap::from([("d1".to_string(), b"tiny".to_vec())]),
        };
        let index = MemoryIndex::new();
        let embedder = StubEmbedder;
        let d = driver(&repo, &index, &embedder);

        let err = d.process_new(&item("d1", "Tiny.txt")).await.unwrap_err();
        assert!(err.to_string().contains("content too short"));
        assert!(index.scan().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn modified_deletes_old_chunks_before_writing() {
        let body = "Replacement content for the reindexed document body. ".repeat(10);
        let repo = StubRepo {
            bodies: HashMap::from([("d1".to_string(), body.into_bytes())]),
        };
        let index = MemoryIndex::new();
        let embedder = StubEmbedder;
        let d = driver(&repo, &index, &embedder);

        // seed two stale chunks for the same document
        let stale = vec![
            stale_chunk("old-1", "d1"),
            stale_chunk("old-2", "d1"),
        ];
        index.seed(stale);

        let matched = IndexedDocument {
            id: Some("d1".to_string()),
            name: "Doc.txt".to_string(),
            modified_at: None,
            last_synced_at: None,
            content_version: None,
            content_digest: None,
            size_bytes: None,
            chunk_ids: vec!["old-1".to_string(), "old-2".to_string()],
        };

        let outcome = d
            .process_modified(&item("d1", "Doc.txt"), &matched)
            .await
            .unwrap();
        assert_eq!(outcome.chunks_deleted, 2);
        assert!(outcome.chunks_written > 0);

        let remaining = index.scan().await.unwrap();
        assert!(remaining.iter().all(|c| !c.chunk_id.starts_with("old-")));
    }

    #[tokio::test]
    async fn deleted_document_loses_all_chunks() {
        let repo = StubRepo {
            bodies: HashMap::new(),
        };
        let index = MemoryIndex::new();
        index.seed(vec![stale_chunk("c1", "gone"), stale_chunk("c2", "gone")]);
        let embedder = StubEmbedder;
        let d = driver(&repo, &index, &embedder);

        let doc = IndexedDocument {
            id: Some("gone".to_string()),
            name: "Old Deck".to_string(),
            modified_at: None,
            last_synced_at: None,
            content_version: None,
            content_digest: None,
            size_bytes: None,
            chunk_ids: vec!["c1".to_string(), "c2".to_string()],
        };

        let outcome = d.process_deleted(&doc).await.unwrap();
        assert_eq!(outcome.chunks_deleted, 2);
        assert!(index.scan().await.unwrap().is_empty());
    }

    fn stale_chunk(chunk_id: &str, doc_id: &str) -> ChunkRecord {
        ChunkRecord {
            chunk_id: chunk_id.to_string(),
            document_id: Some(doc_id.to_string()),
            document_name: "Doc.txt".to_string(),
            text: "stale".to_string(),
            position: crate::models::PositionRange {
                start_line: 1,
                end_line: 1,
                start_offset: 0,
                end_offset: 5,
            },
            metadata: DocumentMetadata {
                modified_at: None,
                last_synced_at: None,
                content_version: None,
                content_digest: None,
                size_bytes: None,
                folder_path: None,
                web_link: None,
            },
            vector: Vec::new(),
        }
    }
}

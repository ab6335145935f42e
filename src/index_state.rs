//! Index state loader.
//!
//! Scans every chunk record in the destination index and reconstructs
//! per-document state: one [`IndexedDocument`] per stable document id,
//! and one per normalized display name for legacy chunks that predate id
//! tracking. Also derives the global sync cutoff (the maximum
//! `last_synced_at` seen across all documents).

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::dedup::normalize_name;
use crate::index::VectorIndex;
use crate::models::{ChunkRecord, IndexedDocument};

/// Everything the classifier needs to know about the index side.
#[derive(Debug, Default)]
pub struct IndexState {
    /// Documents keyed by stable id.
    pub by_id: HashMap<String, IndexedDocument>,
    /// Legacy documents (no id on any chunk), keyed by normalized name.
    pub by_name: HashMap<String, IndexedDocument>,
    /// Max `last_synced_at` across all documents. `None` means no prior
    /// sync; the classifier substitutes an N-day lookback.
    pub latest_synced_at: Option<DateTime<Utc>>,
}

impl IndexState {
    pub fn document_count(&self) -> usize {
        self.by_id.len() + self.by_name.len()
    }

    /// Iterate all known documents, id-keyed and legacy alike.
    pub fn all_documents(&self) -> impl Iterator<Item = &IndexedDocument> {
        self.by_id.values().chain(self.by_name.values())
    }
}

/// Full index scan. A read failure is fatal to the run: classifying
/// against partial index state produces false NEW and DELETED actions.
pub async fn load_index_state(index: &dyn VectorIndex) -> Result<IndexState> {
    let records = index
        .scan()
        .await
        .context("Index scan failed; aborting before any classification")?;

    Ok(build_state(records))
}

fn build_state(records: Vec<ChunkRecord>) -> IndexState {
    let mut state = IndexState::default();

    for record in records {
        let doc = match &record.document_id {
            Some(id) => state
                .by_id
                .entry(id.clone())
                .or_insert_with(|| seed_document(&record)),
            None => state
                .by_name
                .entry(normalize_name(&record.document_name))
                .or_insert_with(|| seed_document(&record)),
        };

        // A partially-failed reindex can leave chunks disagreeing on
        // metadata; trust the most recently synced chunk's view.
        if record.metadata.last_synced_at > doc.last_synced_at {
            doc.name = record.document_name.clone();
            doc.modified_at = record.metadata.modified_at;
            doc.last_synced_at = record.metadata.last_synced_at;
            doc.content_version = record.metadata.content_version;
            doc.content_digest = record.metadata.content_digest.clone();
            doc.size_bytes = record.metadata.size_bytes;
        }

        doc.chunk_ids.push(record.chunk_id);

        if record.metadata.last_synced_at > state.latest_synced_at {
            state.latest_synced_at = record.metadata.last_synced_at;
        }
    }

    state
}

fn seed_document(record: &ChunkRecord) -> IndexedDocument {
    IndexedDocument {
        id: record.document_id.clone(),
        name: record.document_name.clone(),
        modified_at: record.metadata.modified_at,
        last_synced_at: record.metadata.last_synced_at,
        content_version: record.metadata.content_version,
        content_digest: record.metadata.content_digest.clone(),
        size_bytes: record.metadata.size_bytes,
        chunk_ids: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentMetadata, PositionRange};

    fn record(
        chunk_id: &str,
        doc_id: Option<&str>,
        name: &str,
        synced: i64,
    ) -> ChunkRecord {
        ChunkRecord {
            chunk_id: chunk_id.to_string(),
            document_id: doc_id.map(String::from),
            document_name: name.to_string(),
            text: String::new(),
            position: PositionRange {
                start_line: 1,
                end_line: 1,
                start_offset: 0,
                end_offset: 0,
            },
            metadata: DocumentMetadata {
                modified_at: DateTime::from_timestamp(synced - 100, 0),
                last_synced_at: DateTime::from_timestamp(synced, 0),
                content_version: Some(1),
                content_digest: None,
                size_bytes: None,
                folder_path: None,
                web_link: None,
            },
            vector: Vec::new(),
        }
    }

    #[test]
    fn groups_chunks_by_document_id() {
        let state = build_state(vec![
            record("c1", Some("d1"), "Doc One", 100),
            record("c2", Some("d1"), "Doc One", 100),
            record("c3", Some("d2"), "Doc Two", 200),
        ]);

        assert_eq!(state.by_id.len(), 2);
        assert!(state.by_name.is_empty());
        assert_eq!(state.by_id["d1"].chunk_ids, vec!["c1", "c2"]);
        assert_eq!(
            state.latest_synced_at,
            DateTime::from_timestamp(200, 0)
        );
    }

    #[test]
    fn legacy_chunks_group_by_normalized_name() {
        let state = build_state(vec![
            record("c1", None, "Old Report.pdf", 100),
            record("c2", None, "Old Report.pdf", 100),
        ]);

        assert!(state.by_id.is_empty());
        assert_eq!(state.by_name.len(), 1);
        let doc = state.by_name.values().next().unwrap();
        assert!(doc.id.is_none());
        assert_eq!(doc.chunk_ids.len(), 2);
    }

    #[test]
    fn empty_index_yields_no_cutoff() {
        let state = build_state(vec![]);
        assert!(state.latest_synced_at.is_none());
        assert_eq!(state.document_count(), 0);
    }

    #[test]
    fn drifted_metadata_resolves_to_newest_sync() {
        let mut newer = record("c2", Some("d1"), "Doc Renamed", 300);
        newer.metadata.content_version = Some(5);
        let state = build_state(vec![record("c1", Some("d1"), "Doc", 100), newer]);

        let doc = &state.by_id["d1"];
        assert_eq!(doc.name, "Doc Renamed");
        assert_eq!(doc.content_version, Some(5));
        assert_eq!(doc.chunk_ids.len(), 2);
    }
}

//! Index statistics and consistency checks.
//!
//! `csync stats` summarizes what is indexed; `csync verify` hunts for
//! the one inconsistency the data model makes detectable: chunks of the
//! same document disagreeing on their denormalized metadata, the
//! fingerprint of a partially-failed reindex.

use std::collections::HashMap;

use anyhow::Result;

use crate::config::Config;
use crate::index::VectorIndex;
use crate::index_sqlite::SqliteIndex;
use crate::models::ChunkRecord;

pub async fn run_stats(config: &Config) -> Result<()> {
    let index = SqliteIndex::connect(&config.index.path).await?;
    let stats = index.describe_stats().await?;

    println!("corpus-sync — Index Stats");
    println!("=========================");
    println!();
    println!("  Index:       {}", config.index.path.display());
    println!(
        "  Size:        {}",
        stats
            .index_size_bytes
            .map(format_bytes)
            .unwrap_or_else(|| "unknown".to_string())
    );
    println!();
    println!("  Documents:   {}", stats.document_count);
    println!("  Chunks:      {}", stats.chunk_count);
    println!("  Legacy:      {} chunks without document id", stats.legacy_chunk_count);

    // Per-folder breakdown from the denormalized chunk metadata
    let records = index.scan().await?;
    let mut by_folder: HashMap<String, (u64, std::collections::HashSet<String>)> = HashMap::new();
    for r in &records {
        let folder = r
            .metadata
            .folder_path
            .clone()
            .unwrap_or_else(|| "(unknown)".to_string());
        let slot = by_folder.entry(folder).or_default();
        slot.0 += 1;
        slot.1.insert(doc_key(r));
    }

    if !by_folder.is_empty() {
        let mut folders: Vec<_> = by_folder.into_iter().collect();
        folders.sort_by(|a, b| b.1 .0.cmp(&a.1 .0));

        println!();
        println!("  By folder:");
        println!("  {:<36} {:>6} {:>8}", "FOLDER", "DOCS", "CHUNKS");
        println!("  {}", "-".repeat(52));
        for (folder, (chunks, docs)) in folders {
            let display = if folder.is_empty() { "/" } else { folder.as_str() };
            println!("  {:<36} {:>6} {:>8}", display, docs.len(), chunks);
        }
    }

    println!();
    index.close().await;
    Ok(())
}

/// A drifted document: its chunks carry more than one metadata view.
#[derive(Debug)]
pub struct DriftedDocument {
    pub name: String,
    pub id: Option<String>,
    pub chunk_count: usize,
    pub distinct_views: usize,
}

pub async fn run_verify(config: &Config) -> Result<Vec<DriftedDocument>> {
    let index = SqliteIndex::connect(&config.index.path).await?;
    let records = index.scan().await?;
    let drifted = find_metadata_drift(&records);

    if drifted.is_empty() {
        println!("verify");
        println!("  {} chunks checked, metadata consistent", records.len());
        println!("ok");
    } else {
        println!("verify");
        println!(
            "  {} document(s) with inconsistent chunk metadata (partial reindex?):",
            drifted.len()
        );
        for d in &drifted {
            println!(
                "    {} — {} chunks, {} metadata views{}",
                d.name,
                d.chunk_count,
                d.distinct_views,
                d.id
                    .as_deref()
                    .map(|id| format!(" (id {})", id))
                    .unwrap_or_default()
            );
        }
        println!("  re-run `csync sync` to reindex the affected documents");
    }

    index.close().await;
    Ok(drifted)
}

fn doc_key(record: &ChunkRecord) -> String {
    match &record.document_id {
        Some(id) => format!("id:{}", id),
        None => format!("name:{}", record.document_name),
    }
}

/// Group chunks by document and count distinct metadata views per group.
pub fn find_metadata_drift(records: &[ChunkRecord]) -> Vec<DriftedDocument> {
    let mut groups: HashMap<String, Vec<&ChunkRecord>> = HashMap::new();
    for r in records {
        groups.entry(doc_key(r)).or_default().push(r);
    }

    let mut drifted = Vec::new();
    for (_, chunks) in groups {
        let mut views: Vec<String> = chunks
            .iter()
            .map(|c| serde_json::to_string(&c.metadata).unwrap_or_default())
            .collect();
        views.sort();
        views.dedup();

        if views.len() > 1 {
            drifted.push(DriftedDocument {
                name: chunks[0].document_name.clone(),
                id: chunks[0].document_id.clone(),
                chunk_count: chunks.len(),
                distinct_views: views.len(),
            });
        }
    }

    drifted.sort_by(|a, b| a.name.cmp(&b.name));
    drifted
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentMetadata, PositionRange};
    use chrono::DateTime;

    fn chunk(doc_id: &str, synced: i64) -> ChunkRecord {
        ChunkRecord {
            chunk_id: uuid::Uuid::new_v4().to_string(),
            document_id: Some(doc_id.to_string()),
            document_name: format!("Doc {}", doc_id),
            text: String::new(),
            position: PositionRange {
                start_line: 1,
                end_line: 1,
                start_offset: 0,
                end_offset: 0,
            },
            metadata: DocumentMetadata {
                modified_at: None,
                last_synced_at: DateTime::from_timestamp(synced, 0),
                content_version: None,
                content_digest: None,
                size_bytes: None,
                folder_path: None,
                web_link: None,
            },
            vector: Vec::new(),
        }
    }

    #[test]
    fn consistent_documents_pass() {
        let records = vec![chunk("a", 100), chunk("a", 100), chunk("b", 200)];
        assert!(find_metadata_drift(&records).is_empty());
    }

    #[test]
    fn drifted_metadata_is_reported_per_document() {
        let records = vec![chunk("a", 100), chunk("a", 999), chunk("b", 200)];
        let drifted = find_metadata_drift(&records);
        assert_eq!(drifted.len(), 1);
        assert_eq!(drifted[0].chunk_count, 2);
        assert_eq!(drifted[0].distinct_views, 2);
    }

    #[test]
    fn bytes_format() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
    }
}

//! Reconciliation run orchestration.
//!
//! Wires the pipeline together in its fixed order: snapshot + index
//! state → filter → duplicate resolver → change classifier → indexing
//! driver. Snapshot and index-state failures abort the whole run before
//! any mutation; everything the driver raises is caught per item.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use chrono::Utc;

use crate::classify::{classify, ClassifierSettings};
use crate::config::Config;
use crate::dedup::resolve_duplicates;
use crate::driver::IndexingDriver;
use crate::embedding::Embedder;
use crate::extract::OcrFallback;
use crate::filter::filter_items;
use crate::index::VectorIndex;
use crate::index_state::load_index_state;
use crate::matcher::NameMatcher;
use crate::models::ChangeKind;
use crate::report::{
    ActionEntry, DeletedEntry, DuplicateEntry, FailureEntry, RejectedEntry, RunReport,
};
use crate::repository::Repository;
use crate::snapshot::build_snapshot;

/// Run-level lock file. Two reconciliation runs against the same index
/// race on document state, so the second one must be refused outright.
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(_) => Ok(Self {
                path: path.to_path_buf(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => bail!(
                "Another sync appears to be running (lock file {} exists). \
                 Remove it if the previous run crashed.",
                path.display()
            ),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Everything a run needs besides configuration. Collaborators come in
/// as trait objects so tests can substitute fakes for any of them.
pub struct RunContext<'a> {
    pub repository: &'a dyn Repository,
    pub index: &'a dyn VectorIndex,
    /// Not consulted in dry-run mode.
    pub embedder: &'a dyn Embedder,
    pub matcher: &'a dyn NameMatcher,
    pub ocr: Option<&'a dyn OcrFallback>,
}

pub async fn run_sync(
    config: &Config,
    ctx: &RunContext<'_>,
    dry_run: bool,
    full: bool,
) -> Result<RunReport> {
    let run_at = Utc::now();

    // Both discovery steps are fatal on failure: no partial state is
    // trustworthy enough to mutate the index from.
    let snapshot = build_snapshot(ctx.repository).await?;
    let state = load_index_state(ctx.index).await?;

    let snapshot_items = snapshot.items.len();
    let folders_walked = snapshot.folders_walked;

    let (eligible, rejected) = filter_items(snapshot.items, &config.filter.master_collections);
    let (winners, duplicates) = resolve_duplicates(eligible);

    let plan = classify(
        winners,
        &state,
        ctx.matcher,
        run_at,
        ClassifierSettings {
            lookback_days: config.sync.lookback_days,
            size_tolerance_bytes: config.sync.size_tolerance_bytes,
            bypass_cutoff: full,
        },
    );

    let mut report = RunReport {
        run_at,
        dry_run,
        snapshot_items,
        folders_walked,
        cutoff: plan.cutoff,
        rejected: rejected
            .iter()
            .map(|r| RejectedEntry {
                name: r.item.name.clone(),
                folder_path: r.item.folder_path.clone(),
                reason: r.reason.to_string(),
            })
            .collect(),
        duplicates: duplicates
            .iter()
            .map(|d| DuplicateEntry {
                name: d.item.name.clone(),
                winner: d.winner_name.clone(),
            })
            .collect(),
        actions: plan
            .entries
            .iter()
            .map(|e| ActionEntry {
                name: e.item.name.clone(),
                id: e.item.id.clone(),
                kind: e.kind,
                note: e.note.clone(),
            })
            .collect(),
        deleted: plan
            .deleted
            .iter()
            .map(|d| DeletedEntry {
                name: d.name.clone(),
                id: d.id.clone(),
                chunk_count: d.chunk_ids.len(),
            })
            .collect(),
        failures: Vec::new(),
        warnings: Vec::new(),
        chunks_written: 0,
        chunks_deleted: 0,
    };

    for entry in &plan.entries {
        if entry.fuzzy_matched {
            report.warnings.push(format!(
                "'{}' matched '{}' by fuzzy name only",
                entry.item.name,
                entry.matched.as_ref().map(|d| d.name.as_str()).unwrap_or("?")
            ));
        }
        if entry.note.as_deref() == Some("legacy record needs id") {
            report
                .warnings
                .push(format!("'{}' upgrades a legacy record without id", entry.item.name));
        }
    }

    if dry_run {
        return Ok(report);
    }

    let driver = IndexingDriver {
        repository: ctx.repository,
        index: ctx.index,
        embedder: ctx.embedder,
        ocr: ctx.ocr,
        chunking: config.chunking.clone(),
        sync: config.sync.clone(),
        embed_batch_size: config.embedding.batch_size,
        run_at,
    };

    for entry in &plan.entries {
        let result = match entry.kind {
            ChangeKind::New => driver.process_new(&entry.item).await,
            ChangeKind::Modified | ChangeKind::Renamed => {
                // matched is always present for these kinds
                let matched = entry.matched.as_ref().expect("modified entry has a match");
                driver.process_modified(&entry.item, matched).await
            }
            ChangeKind::Unchanged => continue,
        };

        match result {
            Ok(outcome) => {
                report.chunks_written += outcome.chunks_written;
                report.chunks_deleted += outcome.chunks_deleted;
            }
            Err(e) => {
                eprintln!("Warning: skipping '{}': {:#}", entry.item.name, e);
                report.failures.push(FailureEntry {
                    name: entry.item.name.clone(),
                    id: entry.item.id.clone(),
                    reason: format!("{:#}", e),
                });
            }
        }
    }

    for doc in &plan.deleted {
        match driver.process_deleted(doc).await {
            Ok(outcome) => report.chunks_deleted += outcome.chunks_deleted,
            Err(e) => {
                eprintln!("Warning: could not delete chunks of '{}': {:#}", doc.name, e);
                report.failures.push(FailureEntry {
                    name: doc.name.clone(),
                    id: doc.id.clone(),
                    reason: format!("{:#}", e),
                });
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_lock_is_exclusive_and_released_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let lock_path = tmp.path().join("sync.lock");

        let lock = RunLock::acquire(&lock_path).unwrap();
        assert!(RunLock::acquire(&lock_path).is_err());

        drop(lock);
        let again = RunLock::acquire(&lock_path);
        assert!(again.is_ok());
    }
}

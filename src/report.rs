//! Per-run report.
//!
//! Everything downstream consumers need from one reconciliation run:
//! classification counts, every action with its reason, rejections,
//! skipped duplicates, per-item failures, and data-quality warnings.
//! Serializable for tabular export; printed in aligned columns for the
//! CLI.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::ChangeKind;

#[derive(Debug, Clone, Serialize)]
pub struct ActionEntry {
    pub name: String,
    pub id: Option<String>,
    pub kind: ChangeKind,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedEntry {
    pub name: String,
    pub folder_path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateEntry {
    pub name: String,
    pub winner: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletedEntry {
    pub name: String,
    pub id: Option<String>,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureEntry {
    pub name: String,
    pub id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_at: DateTime<Utc>,
    pub dry_run: bool,
    pub snapshot_items: usize,
    pub folders_walked: usize,
    pub cutoff: DateTime<Utc>,
    pub rejected: Vec<RejectedEntry>,
    pub duplicates: Vec<DuplicateEntry>,
    pub actions: Vec<ActionEntry>,
    pub deleted: Vec<DeletedEntry>,
    pub failures: Vec<FailureEntry>,
    /// Data-quality flags: legacy id upgrades, fuzzy-only matches.
    pub warnings: Vec<String>,
    pub chunks_written: u64,
    pub chunks_deleted: u64,
}

impl RunReport {
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.actions.iter().filter(|a| a.kind == kind).count()
    }

    /// The run's exit status is non-zero iff this is true.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn print_summary(&self) {
        if self.dry_run {
            println!("sync (dry-run)");
        } else {
            println!("sync");
        }
        println!(
            "  snapshot: {} items in {} folders",
            self.snapshot_items, self.folders_walked
        );
        println!("  filtered out: {}", self.rejected.len());
        println!("  duplicates skipped: {}", self.duplicates.len());
        println!(
            "  new: {}  modified: {}  renamed: {}  unchanged: {}  deleted: {}",
            self.count(ChangeKind::New),
            self.count(ChangeKind::Modified),
            self.count(ChangeKind::Renamed),
            self.count(ChangeKind::Unchanged),
            self.deleted.len()
        );

        let pending: Vec<&ActionEntry> = self
            .actions
            .iter()
            .filter(|a| a.kind != ChangeKind::Unchanged)
            .collect();
        if !pending.is_empty() {
            println!();
            println!("  {:<12} {:<44} {}", "ACTION", "NAME", "REASON");
            for a in pending {
                println!(
                    "  {:<12} {:<44} {}",
                    a.kind.to_string(),
                    truncate(&a.name, 44),
                    a.note.as_deref().unwrap_or("")
                );
            }
            for d in &self.deleted {
                println!(
                    "  {:<12} {:<44} {} chunks",
                    "DELETED",
                    truncate(&d.name, 44),
                    d.chunk_count
                );
            }
        }

        if !self.warnings.is_empty() {
            println!();
            println!("  review flags:");
            for w in &self.warnings {
                println!("    - {}", w);
            }
        }

        if !self.dry_run {
            println!();
            println!("  chunks written: {}", self.chunks_written);
            println!("  chunks deleted: {}", self.chunks_deleted);
        }

        if self.has_failures() {
            println!();
            println!("  failures: {}", self.failures.len());
            for f in &self.failures {
                println!("    {} — {}", f.name, f.reason);
            }
        } else if !self.dry_run {
            println!("ok");
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_kind() {
        let report = RunReport {
            run_at: Utc::now(),
            dry_run: false,
            snapshot_items: 3,
            folders_walked: 1,
            cutoff: Utc::now(),
            rejected: vec![],
            duplicates: vec![],
            actions: vec![
                ActionEntry {
                    name: "a".into(),
                    id: None,
                    kind: ChangeKind::New,
                    note: None,
                },
                ActionEntry {
                    name: "b".into(),
                    id: None,
                    kind: ChangeKind::Unchanged,
                    note: None,
                },
                ActionEntry {
                    name: "c".into(),
                    id: None,
                    kind: ChangeKind::New,
                    note: None,
                },
            ],
            deleted: vec![],
            failures: vec![],
            warnings: vec![],
            chunks_written: 0,
            chunks_deleted: 0,
        };
        assert_eq!(report.count(ChangeKind::New), 2);
        assert_eq!(report.count(ChangeKind::Unchanged), 1);
        assert!(!report.has_failures());
    }

    #[test]
    fn report_serializes_to_json() {
        let report = RunReport {
            run_at: Utc::now(),
            dry_run: true,
            snapshot_items: 0,
            folders_walked: 0,
            cutoff: Utc::now(),
            rejected: vec![],
            duplicates: vec![],
            actions: vec![],
            deleted: vec![],
            failures: vec![FailureEntry {
                name: "x".into(),
                id: None,
                reason: "content too short".into(),
            }],
            warnings: vec![],
            chunks_written: 0,
            chunks_deleted: 0,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("content too short"));
    }
}

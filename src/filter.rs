//! Filter stage.
//!
//! Drops source items that must never be indexed. A total function of
//! (item, supported-format set, pattern sets): no state, no ordering
//! dependency between items. Rules apply in a fixed order and the first
//! match wins, so every rejection carries a single unambiguous reason.

use serde::Serialize;

use crate::dedup::normalize_name;
use crate::models::{FormatTag, SourceItem};

/// Why an item was rejected, in rule order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    TemporaryCopy,
    Archived,
    UnresolvedShortcut,
    UnsupportedFormat,
    SubordinateToMaster,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectReason::TemporaryCopy => "temporary/copy",
            RejectReason::Archived => "archived",
            RejectReason::UnresolvedShortcut => "unresolved shortcut",
            RejectReason::UnsupportedFormat => "unsupported format",
            RejectReason::SubordinateToMaster => "subordinate to master",
        };
        f.write_str(s)
    }
}

/// A rejected item plus its reason, kept for the run report.
#[derive(Debug, Clone)]
pub struct Rejected {
    pub item: SourceItem,
    pub reason: RejectReason,
}

/// Archival/deprecation tokens, matched case-insensitively anywhere in
/// the name.
const ARCHIVE_TOKENS: &[&str] = &["archived", "deprecated", "(old)", "backup"];

/// Split the snapshot into indexable items and rejections.
pub fn filter_items(
    items: Vec<SourceItem>,
    master_collections: &[String],
) -> (Vec<SourceItem>, Vec<Rejected>) {
    let mut kept = Vec::with_capacity(items.len());
    let mut rejected = Vec::new();

    for item in items {
        match reject_reason(&item, master_collections) {
            Some(reason) => rejected.push(Rejected { item, reason }),
            None => kept.push(item),
        }
    }

    (kept, rejected)
}

fn reject_reason(item: &SourceItem, master_collections: &[String]) -> Option<RejectReason> {
    let lower = item.name.to_lowercase();

    if is_temporary_copy(&lower) {
        return Some(RejectReason::TemporaryCopy);
    }

    if ARCHIVE_TOKENS.iter().any(|t| lower.contains(t)) {
        return Some(RejectReason::Archived);
    }

    if item.format == FormatTag::Shortcut {
        return Some(RejectReason::UnresolvedShortcut);
    }

    if !item.format.is_indexable() {
        return Some(RejectReason::UnsupportedFormat);
    }

    if let Some(master) = subordinate_master(&item.name, master_collections) {
        // The master record itself stays indexable.
        if normalize_name(&item.name) != normalize_name(master) {
            return Some(RejectReason::SubordinateToMaster);
        }
    }

    None
}

fn is_temporary_copy(lower_name: &str) -> bool {
    // Office lock files and editor temp markers
    if lower_name.starts_with("~$") || lower_name.starts_with(".~") {
        return true;
    }
    if lower_name.ends_with(".tmp") || lower_name.ends_with(".bak") {
        return true;
    }
    if lower_name.starts_with("copy of ") {
        return true;
    }
    has_copy_marker(lower_name)
}

/// Parenthesized copy markers like "Report (1).pdf" — a one- or
/// two-digit number in parentheses at the end of the stem. Longer
/// numbers ("Plan (2024).pdf") are treated as part of the title.
fn has_copy_marker(lower_name: &str) -> bool {
    let stem = lower_name
        .rsplit_once('.')
        .map(|(s, _)| s)
        .unwrap_or(lower_name)
        .trim_end();

    let Some(open) = stem.rfind('(') else {
        return false;
    };
    let Some(inner) = stem[open + 1..].strip_suffix(')') else {
        return false;
    };

    !inner.is_empty() && inner.len() <= 2 && inner.chars().all(|c| c.is_ascii_digit())
}

fn subordinate_master<'a>(name: &str, masters: &'a [String]) -> Option<&'a String> {
    let lower = name.to_lowercase();
    masters
        .iter()
        .find(|m| !m.is_empty() && lower.contains(&m.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(name: &str, format: FormatTag) -> SourceItem {
        SourceItem {
            id: Some(name.to_string()),
            name: name.to_string(),
            format,
            folder_path: String::new(),
            modified_at: Utc::now(),
            created_at: Utc::now(),
            size_bytes: Some(1),
            content_version: None,
            content_digest: None,
            web_link: None,
        }
    }

    fn reason_for(name: &str, format: FormatTag) -> Option<RejectReason> {
        let (kept, rejected) = filter_items(vec![item(name, format)], &[]);
        if kept.len() == 1 {
            None
        } else {
            Some(rejected[0].reason)
        }
    }

    #[test]
    fn temp_and_copy_names_rejected() {
        assert_eq!(
            reason_for("~$Budget.docx", FormatTag::WordDoc),
            Some(RejectReason::TemporaryCopy)
        );
        assert_eq!(
            reason_for("Copy of Plan.pdf", FormatTag::Pdf),
            Some(RejectReason::TemporaryCopy)
        );
        assert_eq!(
            reason_for("Report (2).pdf", FormatTag::Pdf),
            Some(RejectReason::TemporaryCopy)
        );
        assert_eq!(reason_for("draft.tmp", FormatTag::Unsupported).unwrap(),
            RejectReason::TemporaryCopy);
    }

    #[test]
    fn year_in_parentheses_is_not_a_copy_marker() {
        assert_eq!(reason_for("Plan (2024).pdf", FormatTag::Pdf), None);
    }

    #[test]
    fn archive_tokens_rejected_case_insensitively() {
        assert_eq!(
            reason_for("Pricing ARCHIVED.xlsx", FormatTag::Workbook),
            Some(RejectReason::Archived)
        );
        assert_eq!(
            reason_for("Handbook (old).docx", FormatTag::WordDoc),
            Some(RejectReason::Archived)
        );
    }

    #[test]
    fn temp_rule_beats_archive_rule() {
        // first match wins: "Copy of ... backup" is temporary, not archived
        assert_eq!(
            reason_for("Copy of backup.docx", FormatTag::WordDoc),
            Some(RejectReason::TemporaryCopy)
        );
    }

    #[test]
    fn shortcuts_and_unsupported_formats_rejected() {
        assert_eq!(
            reason_for("alias.txt", FormatTag::Shortcut),
            Some(RejectReason::UnresolvedShortcut)
        );
        assert_eq!(
            reason_for("installer.exe", FormatTag::Unsupported),
            Some(RejectReason::UnsupportedFormat)
        );
    }

    #[test]
    fn subordinate_records_rejected_but_master_kept() {
        let masters = vec!["Onboarding Checklist".to_string()];
        let (kept, rejected) = filter_items(
            vec![
                item("Onboarding Checklist", FormatTag::NativeSheet),
                item("Onboarding Checklist - Jane Doe", FormatTag::NativeSheet),
            ],
            &masters,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "Onboarding Checklist");
        assert_eq!(rejected[0].reason, RejectReason::SubordinateToMaster);
    }

    #[test]
    fn plain_documents_pass() {
        assert_eq!(reason_for("Q3 Report.pdf", FormatTag::Pdf), None);
        assert_eq!(reason_for("notes.md", FormatTag::Markdown), None);
    }
}

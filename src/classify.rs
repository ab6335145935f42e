//! Change classifier.
//!
//! For every winning source item, resolves identity against the loaded
//! index state and assigns an action. Resolution order: exact id match,
//! exact normalized-name match (the legacy path), then fuzzy name match
//! through the pluggable [`NameMatcher`]. An ambiguous fuzzy result is
//! treated as no confident match.
//!
//! Classification order matters: the cutoff short-circuit runs before
//! any fine-grained signal comparison, so a large, mostly-static
//! repository costs almost nothing to reconcile.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::dedup::normalize_name;
use crate::index_state::IndexState;
use crate::matcher::NameMatcher;
use crate::models::{
    ChangeKind, ChangeSignals, Classified, IndexedDocument, SourceItem,
};

/// Classifier tuning, lifted from `[sync]` config.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierSettings {
    /// Lookback window substituted when the index has never been synced.
    pub lookback_days: i64,
    /// Size deltas at or under this many bytes are noise, not changes.
    pub size_tolerance_bytes: u64,
    /// Skip the cutoff short-circuit (`sync --full`); every matched item
    /// gets the full signal comparison.
    pub bypass_cutoff: bool,
}

/// The classifier's complete output for one run.
#[derive(Debug)]
pub struct SyncPlan {
    pub entries: Vec<Classified>,
    /// Index documents no winning item could reach.
    pub deleted: Vec<IndexedDocument>,
    /// The cutoff actually used, for the run report.
    pub cutoff: DateTime<Utc>,
}

impl SyncPlan {
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }
}

#[derive(Hash, PartialEq, Eq)]
enum DocKey {
    Id(String),
    Name(String),
}

enum MatchPath {
    ById,
    ByName,
    Fuzzy,
}

pub fn classify(
    winners: Vec<SourceItem>,
    state: &IndexState,
    matcher: &dyn NameMatcher,
    now: DateTime<Utc>,
    settings: ClassifierSettings,
) -> SyncPlan {
    let cutoff = state
        .latest_synced_at
        .unwrap_or_else(|| now - Duration::days(settings.lookback_days));

    let mut matched_keys: HashSet<DocKey> = HashSet::new();
    let mut entries = Vec::with_capacity(winners.len());

    for item in winners {
        let resolved = resolve(&item, state, matcher);

        let Some((doc, key, path)) = resolved else {
            entries.push(Classified {
                item,
                matched: None,
                kind: ChangeKind::New,
                signals: ChangeSignals::default(),
                note: None,
                fuzzy_matched: false,
            });
            continue;
        };

        matched_keys.insert(key);
        let fuzzy_matched = matches!(path, MatchPath::Fuzzy);

        if !settings.bypass_cutoff && item.modified_at <= cutoff {
            entries.push(Classified {
                item,
                matched: Some(doc.clone()),
                kind: ChangeKind::Unchanged,
                signals: ChangeSignals::default(),
                note: Some("not modified since last sync".to_string()),
                fuzzy_matched,
            });
            continue;
        }

        if doc.id.is_none() {
            // Legacy records are reindexed unconditionally so their
            // chunks pick up a stable id.
            entries.push(Classified {
                item,
                matched: Some(doc.clone()),
                kind: ChangeKind::Modified,
                signals: ChangeSignals::default(),
                note: Some("legacy record needs id".to_string()),
                fuzzy_matched,
            });
            continue;
        }

        let signals = compute_signals(&item, doc, settings.size_tolerance_bytes);

        let (kind, note) = if signals.content_changed() {
            let kind = if signals.name_changed {
                ChangeKind::Renamed
            } else {
                ChangeKind::Modified
            };
            (kind, Some(format!("signals: {}", signals.describe())))
        } else {
            (
                ChangeKind::Unchanged,
                Some("no change signals".to_string()),
            )
        };

        entries.push(Classified {
            item,
            matched: Some(doc.clone()),
            kind,
            signals,
            note,
            fuzzy_matched,
        });
    }

    // Anything the winners never reached is gone from the repository.
    let mut deleted = Vec::new();
    for (id, doc) in &state.by_id {
        if !matched_keys.contains(&DocKey::Id(id.clone())) {
            deleted.push(doc.clone());
        }
    }
    for (name, doc) in &state.by_name {
        if !matched_keys.contains(&DocKey::Name(name.clone())) {
            deleted.push(doc.clone());
        }
    }
    deleted.sort_by(|a, b| a.name.cmp(&b.name));

    SyncPlan {
        entries,
        deleted,
        cutoff,
    }
}

fn resolve<'a>(
    item: &SourceItem,
    state: &'a IndexState,
    matcher: &dyn NameMatcher,
) -> Option<(&'a IndexedDocument, DocKey, MatchPath)> {
    if let Some(id) = &item.id {
        if let Some(doc) = state.by_id.get(id) {
            return Some((doc, DocKey::Id(id.clone()), MatchPath::ById));
        }
    }

    let norm = normalize_name(&item.name);
    if let Some(doc) = state.by_name.get(&norm) {
        return Some((doc, DocKey::Name(norm), MatchPath::ByName));
    }

    // Fuzzy: accept exactly one confident candidate; ties mean no match.
    let mut candidates = Vec::new();
    for (id, doc) in &state.by_id {
        if matcher.matches(&item.name, &doc.name) {
            candidates.push((doc, DocKey::Id(id.clone())));
        }
    }
    for (name, doc) in &state.by_name {
        if matcher.matches(&item.name, &doc.name) {
            candidates.push((doc, DocKey::Name(name.clone())));
        }
    }

    if candidates.len() == 1 {
        let (doc, key) = candidates.pop().unwrap();
        return Some((doc, key, MatchPath::Fuzzy));
    }

    None
}

fn compute_signals(
    item: &SourceItem,
    doc: &IndexedDocument,
    size_tolerance: u64,
) -> ChangeSignals {
    let version_changed = match (item.content_version, doc.content_version) {
        (Some(a), Some(b)) => a > b,
        _ => false,
    };

    let digest_changed = match (&item.content_digest, &doc.content_digest) {
        (Some(a), Some(b)) => a != b,
        _ => false,
    };

    let size_changed = match (item.size_bytes, doc.size_bytes) {
        (Some(a), Some(b)) => a.abs_diff(b) > size_tolerance,
        _ => false,
    };

    // An unknown indexed modification time cannot prove the item is
    // stale; treat it as changed.
    let date_changed = doc
        .modified_at
        .map_or(true, |m| item.modified_at > m);

    let name_changed = item.name != doc.name;

    ChangeSignals {
        version_changed,
        digest_changed,
        size_changed,
        date_changed,
        name_changed,
    }
}

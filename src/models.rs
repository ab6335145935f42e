//! Core data models for the reconciliation pipeline.
//!
//! These types flow between the pipeline stages: snapshot items from the
//! repository, reconstructed index-side documents, chunk records, and the
//! per-run classification results.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Closed set of document formats the engine understands.
///
/// Every item listed by a repository carries one of these tags, and text
/// extraction dispatches on it exhaustively. Repository-native formats
/// rank above their exported counterparts when a duplicate-name group
/// must pick a single winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatTag {
    /// Repository-native rich document (downloaded as OOXML word processing bytes).
    NativeDoc,
    /// Repository-native slide deck (downloaded as OOXML presentation bytes).
    NativeSlides,
    /// Repository-native spreadsheet (downloaded as OOXML workbook bytes).
    NativeSheet,
    /// Exported `.docx` file.
    WordDoc,
    /// Exported `.pptx` file.
    SlideDeck,
    /// Exported `.xlsx` file.
    Workbook,
    /// Portable document (`.pdf`).
    Pdf,
    /// Markdown text.
    Markdown,
    /// Plain text.
    PlainText,
    /// A shortcut/link item. Never indexed directly; the snapshot builder
    /// either resolves it to its target or leaves it tagged for rejection.
    Shortcut,
    /// Anything the engine cannot extract text from.
    Unsupported,
}

impl FormatTag {
    /// Winner-selection priority within a duplicate-name group.
    /// Lower is preferred: native formats first, then exports in order of
    /// how much structure survives extraction, with PDF as the flattest
    /// text-bearing form.
    pub fn priority(self) -> u8 {
        match self {
            FormatTag::NativeDoc => 0,
            FormatTag::NativeSlides => 1,
            FormatTag::NativeSheet => 2,
            FormatTag::WordDoc => 3,
            FormatTag::SlideDeck => 4,
            FormatTag::Workbook => 5,
            FormatTag::Markdown => 6,
            FormatTag::PlainText => 7,
            FormatTag::Pdf => 8,
            FormatTag::Shortcut | FormatTag::Unsupported => u8::MAX,
        }
    }

    /// Whether this format is in the indexable allow-list.
    pub fn is_indexable(self) -> bool {
        !matches!(self, FormatTag::Shortcut | FormatTag::Unsupported)
    }

    /// Map a file name to a format tag by extension. Unknown extensions
    /// become [`FormatTag::Unsupported`].
    pub fn from_file_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        let ext = lower.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
        match ext {
            "gdoc" => FormatTag::NativeDoc,
            "gslides" => FormatTag::NativeSlides,
            "gsheet" => FormatTag::NativeSheet,
            "docx" => FormatTag::WordDoc,
            "pptx" => FormatTag::SlideDeck,
            "xlsx" => FormatTag::Workbook,
            "pdf" => FormatTag::Pdf,
            "md" | "markdown" => FormatTag::Markdown,
            "txt" => FormatTag::PlainText,
            _ => FormatTag::Unsupported,
        }
    }
}

impl std::fmt::Display for FormatTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FormatTag::NativeDoc => "native-doc",
            FormatTag::NativeSlides => "native-slides",
            FormatTag::NativeSheet => "native-sheet",
            FormatTag::WordDoc => "docx",
            FormatTag::SlideDeck => "pptx",
            FormatTag::Workbook => "xlsx",
            FormatTag::Pdf => "pdf",
            FormatTag::Markdown => "markdown",
            FormatTag::PlainText => "text",
            FormatTag::Shortcut => "shortcut",
            FormatTag::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

/// One leaf file from the repository snapshot. Rebuilt fresh on every
/// reconciliation run; never persisted by this engine.
#[derive(Debug, Clone)]
pub struct SourceItem {
    /// Stable repository-assigned identifier. Absent for legacy paths.
    pub id: Option<String>,
    pub name: String,
    pub format: FormatTag,
    /// Folder path from the repository root, `/`-separated.
    pub folder_path: String,
    pub modified_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub size_bytes: Option<u64>,
    /// Monotonic content revision counter, where the repository tracks one.
    pub content_version: Option<i64>,
    pub content_digest: Option<String>,
    pub web_link: Option<String>,
}

/// Denormalized copy of the owning document's identity and version fields,
/// stamped onto every chunk. The index has no native foreign-key join, so
/// this is the only place document state lives. After a successful
/// reindex all chunks of a document carry identical metadata; drift marks
/// a partially-failed reindex (see `verify`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentMetadata {
    pub modified_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub content_version: Option<i64>,
    pub content_digest: Option<String>,
    pub size_bytes: Option<u64>,
    pub folder_path: Option<String>,
    pub web_link: Option<String>,
}

/// Start/end position of a chunk within its document's extracted text,
/// kept for citation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PositionRange {
    pub start_line: u32,
    pub end_line: u32,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// One embedded unit of text as stored in the vector index.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub chunk_id: String,
    /// Owning document's stable id. None for chunks indexed before key
    /// tracking existed (the legacy case).
    pub document_id: Option<String>,
    pub document_name: String,
    pub text: String,
    pub position: PositionRange,
    pub metadata: DocumentMetadata,
    /// Embedding vector. Index scans may return this empty; vectors are
    /// only required on upsert.
    pub vector: Vec<f32>,
}

/// The engine's reconstruction of one logical document's current index
/// state, aggregated from all chunk records sharing the same document
/// key. Built fresh each run from a full index scan.
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    /// None for legacy documents whose chunks predate key tracking.
    pub id: Option<String>,
    pub name: String,
    pub modified_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub content_version: Option<i64>,
    pub content_digest: Option<String>,
    pub size_bytes: Option<u64>,
    /// Chunk record identifiers belonging to this document, in scan order.
    pub chunk_ids: Vec<String>,
}

/// Independent pieces of evidence used to decide MODIFIED vs UNCHANGED.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSignals {
    pub version_changed: bool,
    pub digest_changed: bool,
    pub size_changed: bool,
    pub date_changed: bool,
    pub name_changed: bool,
}

impl ChangeSignals {
    /// True when any content-bearing signal fired. A name change alone
    /// does not force a reindex.
    pub fn content_changed(self) -> bool {
        self.version_changed || self.digest_changed || self.size_changed || self.date_changed
    }

    /// Short diagnostic string listing the signals that fired.
    pub fn describe(self) -> String {
        let mut parts = Vec::new();
        if self.version_changed {
            parts.push("version");
        }
        if self.digest_changed {
            parts.push("digest");
        }
        if self.size_changed {
            parts.push("size");
        }
        if self.date_changed {
            parts.push("date");
        }
        if self.name_changed {
            parts.push("name");
        }
        parts.join("+")
    }
}

/// Per-item action assigned by the change classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    New,
    Modified,
    /// Modified with a display-name change on top; reindexed exactly like
    /// [`ChangeKind::Modified`] but reported separately.
    Renamed,
    Unchanged,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChangeKind::New => "NEW",
            ChangeKind::Modified => "MODIFIED",
            ChangeKind::Renamed => "RENAMED",
            ChangeKind::Unchanged => "UNCHANGED",
        };
        f.write_str(s)
    }
}

/// A classified (item, matched-document) pair plus the evidence that
/// produced the classification. Ephemeral, computed per run.
#[derive(Debug, Clone)]
pub struct Classified {
    pub item: SourceItem,
    pub matched: Option<IndexedDocument>,
    pub kind: ChangeKind,
    pub signals: ChangeSignals,
    /// Why the classifier decided what it did ("not modified since last
    /// sync", "legacy record needs id", ...).
    pub note: Option<String>,
    /// The match came from the fuzzy name path. Probabilistic; flagged
    /// for review in the run report.
    pub fuzzy_matched: bool,
}

//! Document repository abstraction.
//!
//! The snapshot builder walks the repository exclusively through the
//! [`Repository`] trait, so remote document stores and the built-in
//! filesystem backend are interchangeable. A repository lists one folder
//! at a time; recursion belongs to the snapshot builder.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{FormatTag, SourceItem};

/// One entry from a single folder listing, file or folder.
#[derive(Debug, Clone)]
pub struct RepoEntry {
    /// Stable identifier the repository assigns to this entry.
    pub id: String,
    pub name: String,
    pub format: FormatTag,
    pub modified_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub size_bytes: Option<u64>,
    pub content_version: Option<i64>,
    pub content_digest: Option<String>,
    pub parent_id: Option<String>,
    /// Folders are containers; they are descended into, never indexed.
    pub is_container: bool,
    /// Shortcut/link entries point at another entry. They are resolved
    /// via [`Repository::resolve_link`] or rejected downstream.
    pub is_link: bool,
    pub web_link: Option<String>,
}

/// A mutable, hierarchical document store the engine reconciles against.
///
/// For repository-native formats, [`download`](Repository::download)
/// returns exported bytes in the corresponding OOXML flavor (native rich
/// document as `.docx` bytes, and so on) — the extraction layer relies on
/// this.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Identifier of the root folder the reconciliation starts from.
    fn root_folder(&self) -> String;

    /// List the direct children of one folder. A listing failure is
    /// fatal to the whole run: a partial snapshot would misclassify
    /// every unlisted document as deleted.
    async fn list(&self, folder_id: &str) -> Result<Vec<RepoEntry>>;

    /// Resolve a link entry to its target, or `None` when the target is
    /// unreachable or resolution is disabled.
    async fn resolve_link(&self, entry: &RepoEntry) -> Result<Option<RepoEntry>>;

    /// Fetch the raw bytes of one item.
    async fn download(&self, item: &SourceItem) -> Result<Vec<u8>>;
}

impl RepoEntry {
    /// Convert a leaf entry into a snapshot item under the given folder path.
    pub fn into_source_item(self, folder_path: &str) -> SourceItem {
        SourceItem {
            id: Some(self.id),
            name: self.name,
            format: self.format,
            folder_path: folder_path.to_string(),
            modified_at: self.modified_at,
            created_at: self.created_at,
            size_bytes: self.size_bytes,
            content_version: self.content_version,
            content_digest: self.content_digest,
            web_link: self.web_link,
        }
    }
}

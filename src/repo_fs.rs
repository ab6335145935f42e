//! Filesystem-backed [`Repository`].
//!
//! Folder ids are `/`-separated paths relative to the configured root
//! (the root itself is the empty string). Symlinks surface as link
//! entries and are resolved only when `follow_symlinks` is set, so the
//! pipeline sees the same shortcut semantics a remote document store
//! would present.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::RepositoryConfig;
use crate::models::{FormatTag, SourceItem};
use crate::repository::{RepoEntry, Repository};

pub struct FsRepository {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
    digest_max_bytes: u64,
}

impl FsRepository {
    pub fn new(config: &RepositoryConfig) -> Result<Self> {
        if !config.root.exists() {
            bail!(
                "Repository root does not exist: {}",
                config.root.display()
            );
        }

        let include = build_globset(&config.include_globs)?;

        let mut default_excludes = vec![
            "**/.git/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        default_excludes.extend(config.exclude_globs.clone());
        let exclude = build_globset(&default_excludes)?;

        Ok(Self {
            root: config.root.clone(),
            include,
            exclude,
            follow_symlinks: config.follow_symlinks,
            digest_max_bytes: config.digest_max_bytes,
        })
    }

    fn abs_path(&self, rel: &str) -> PathBuf {
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }

    fn entry_for_path(&self, path: &Path, rel: &str, name: &str, is_link: bool) -> Result<RepoEntry> {
        let metadata = std::fs::symlink_metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        let is_container = metadata.is_dir();

        let modified_at = system_time_to_utc(metadata.modified().ok());
        let created_at = system_time_to_utc(metadata.created().ok().or(metadata.modified().ok()));

        let (format, size_bytes, content_digest) = if is_container || is_link {
            (FormatTag::Unsupported, None, None)
        } else {
            let size = metadata.len();
            let digest = if size <= self.digest_max_bytes {
                std::fs::read(path).ok().map(|bytes| {
                    let mut hasher = Sha256::new();
                    hasher.update(&bytes);
                    format!("{:x}", hasher.finalize())
                })
            } else {
                None
            };
            (FormatTag::from_file_name(name), Some(size), digest)
        };

        let parent_id = rel
            .rsplit_once('/')
            .map(|(parent, _)| parent.to_string())
            .or(if rel.is_empty() { None } else { Some(String::new()) });

        Ok(RepoEntry {
            id: rel.to_string(),
            name: name.to_string(),
            format: if is_link { FormatTag::Shortcut } else { format },
            modified_at,
            created_at,
            size_bytes,
            content_version: None,
            content_digest,
            parent_id,
            is_container,
            is_link,
            web_link: Some(format!("file://{}", path.display())),
        })
    }
}

#[async_trait]
impl Repository for FsRepository {
    fn root_folder(&self) -> String {
        String::new()
    }

    async fn list(&self, folder_id: &str) -> Result<Vec<RepoEntry>> {
        let dir = self.abs_path(folder_id);
        if !dir.is_dir() {
            bail!("Not a folder in the repository: {}", dir.display());
        }

        let mut entries = Vec::new();

        // Single-level listing; the snapshot builder owns the recursion.
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).follow_links(false) {
            let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
            let name = entry.file_name().to_string_lossy().to_string();

            let rel = if folder_id.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", folder_id, name)
            };

            let is_link = entry.path_is_symlink();
            let is_dir = entry.file_type().is_dir();

            if self.exclude.is_match(&rel) {
                continue;
            }
            // Include globs gate files only; folders must stay visible so
            // descent can reach matching files deeper down.
            if !is_dir && !is_link && !self.include.is_match(&rel) {
                continue;
            }

            entries.push(self.entry_for_path(entry.path(), &rel, &name, is_link)?);
        }

        // Deterministic ordering for stable reports and tests
        entries.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(entries)
    }

    async fn resolve_link(&self, entry: &RepoEntry) -> Result<Option<RepoEntry>> {
        if !self.follow_symlinks {
            return Ok(None);
        }

        let link_path = self.abs_path(&entry.id);
        let target = match std::fs::canonicalize(&link_path) {
            Ok(t) => t,
            Err(_) => return Ok(None), // dangling link
        };

        // Targets outside the root are not part of the repository.
        let root = std::fs::canonicalize(&self.root)?;
        let rel = match target.strip_prefix(&root) {
            Ok(r) => r.to_string_lossy().replace('\\', "/"),
            Err(_) => return Ok(None),
        };

        if target.is_dir() {
            return Ok(None); // folder shortcuts are not followed
        }

        let resolved = self.entry_for_path(&target, &rel, &entry.name, false)?;
        Ok(Some(resolved))
    }

    async fn download(&self, item: &SourceItem) -> Result<Vec<u8>> {
        let rel = match &item.id {
            Some(id) => id.clone(),
            None => {
                if item.folder_path.is_empty() {
                    item.name.clone()
                } else {
                    format!("{}/{}", item.folder_path, item.name)
                }
            }
        };
        let path = self.abs_path(&rel);
        std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

fn system_time_to_utc(t: Option<std::time::SystemTime>) -> DateTime<Utc> {
    let secs = t
        .and_then(|t| t.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryConfig;

    fn repo_config(root: &Path) -> RepositoryConfig {
        RepositoryConfig {
            root: root.to_path_buf(),
            include_globs: vec!["**/*".to_string()],
            exclude_globs: vec![],
            follow_symlinks: false,
            digest_max_bytes: 4 * 1024 * 1024,
        }
    }

    #[tokio::test]
    async fn lists_files_and_folders_with_relative_ids() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "alpha").unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("sub/b.md"), "beta").unwrap();

        let repo = FsRepository::new(&repo_config(tmp.path())).unwrap();

        let top = repo.list("").await.unwrap();
        assert_eq!(top.len(), 2);
        let file = top.iter().find(|e| !e.is_container).unwrap();
        assert_eq!(file.id, "a.txt");
        assert_eq!(file.format, FormatTag::PlainText);
        assert!(file.content_digest.is_some());

        let sub = repo.list("sub").await.unwrap();
        assert_eq!(sub.len(), 1);
        assert_eq!(sub[0].id, "sub/b.md");
        assert_eq!(sub[0].format, FormatTag::Markdown);
    }

    #[tokio::test]
    async fn listing_a_missing_folder_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = FsRepository::new(&repo_config(tmp.path())).unwrap();
        assert!(repo.list("does-not-exist").await.is_err());
    }

    #[tokio::test]
    async fn download_reads_item_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("doc.txt"), "document body").unwrap();
        let repo = FsRepository::new(&repo_config(tmp.path())).unwrap();

        let entries = repo.list("").await.unwrap();
        let item = entries[0].clone().into_source_item("");
        let bytes = repo.download(&item).await.unwrap();
        assert_eq!(bytes, b"document body");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_surface_as_link_entries() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("real.txt"), "target text").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("real.txt"), tmp.path().join("alias.txt"))
            .unwrap();

        let repo = FsRepository::new(&repo_config(tmp.path())).unwrap();
        let entries = repo.list("").await.unwrap();
        let link = entries.iter().find(|e| e.is_link).unwrap();
        assert_eq!(link.format, FormatTag::Shortcut);

        // resolution disabled -> stays unresolved
        assert!(repo.resolve_link(link).await.unwrap().is_none());

        let mut cfg = repo_config(tmp.path());
        cfg.follow_symlinks = true;
        let repo = FsRepository::new(&cfg).unwrap();
        let entries = repo.list("").await.unwrap();
        let link = entries.iter().find(|e| e.is_link).unwrap();
        let target = repo.resolve_link(link).await.unwrap().unwrap();
        assert_eq!(target.format, FormatTag::PlainText);
        assert_eq!(target.name, "alias.txt");
    }
}

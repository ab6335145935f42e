//! Repository snapshot builder.
//!
//! Walks the repository hierarchy through [`Repository::list`] and
//! flattens it into leaf [`SourceItem`]s annotated with their folder
//! path. The walk state lives in an explicit accumulator that is
//! returned with the result; nothing module-level, nothing shared.
//!
//! Any listing failure aborts the walk: acting on a partial snapshot
//! would classify every unlisted document as deleted.

use anyhow::{Context, Result};

use crate::models::SourceItem;
use crate::repository::Repository;

/// Flat view of the repository at one instant.
#[derive(Debug)]
pub struct Snapshot {
    pub items: Vec<SourceItem>,
    pub folders_walked: usize,
    /// Link entries that resolved to a target (reported for diagnostics).
    pub links_resolved: usize,
}

/// Walk the whole tree under the repository's root folder.
pub async fn build_snapshot(repo: &dyn Repository) -> Result<Snapshot> {
    let mut acc = Snapshot {
        items: Vec::new(),
        folders_walked: 0,
        links_resolved: 0,
    };

    // Depth-first over an explicit stack of (folder id, display path).
    let mut pending: Vec<(String, String)> = vec![(repo.root_folder(), String::new())];

    while let Some((folder_id, folder_path)) = pending.pop() {
        let entries = repo
            .list(&folder_id)
            .await
            .with_context(|| format!("Repository listing failed for folder '{}'", folder_path))?;
        acc.folders_walked += 1;

        for entry in entries {
            if entry.is_container {
                let child_path = if folder_path.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{}/{}", folder_path, entry.name)
                };
                pending.push((entry.id, child_path));
                continue;
            }

            if entry.is_link {
                match repo.resolve_link(&entry).await? {
                    Some(target) => {
                        acc.links_resolved += 1;
                        acc.items.push(target.into_source_item(&folder_path));
                    }
                    // Unresolved links pass through tagged as shortcuts;
                    // the filter stage rejects them with a reason.
                    None => acc.items.push(entry.into_source_item(&folder_path)),
                }
                continue;
            }

            acc.items.push(entry.into_source_item(&folder_path));
        }
    }

    Ok(acc)
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub repository: RepositoryConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryConfig {
    /// Root of the document tree to reconcile against.
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Follow symlinks to their targets; unresolved links are rejected
    /// by the filter stage.
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Files larger than this are listed without a content digest.
    #[serde(default = "default_digest_max_bytes")]
    pub digest_max_bytes: u64,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

fn default_digest_max_bytes() -> u64 {
    4 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// SQLite database file backing the vector index.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Tuning knobs for the change classifier and indexing driver.
#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Lookback window when the index holds no prior sync timestamp.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    /// Size deltas at or under this many bytes do not count as a change.
    #[serde(default = "default_size_tolerance")]
    pub size_tolerance_bytes: u64,
    /// Extracted text shorter than this is a per-item failure.
    #[serde(default = "default_min_content")]
    pub min_content_chars: usize,
    /// Normalized-name length at which substring containment counts as a
    /// fuzzy match.
    #[serde(default = "default_fuzzy_min_len")]
    pub fuzzy_min_len: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            size_tolerance_bytes: default_size_tolerance(),
            min_content_chars: default_min_content(),
            fuzzy_min_len: default_fuzzy_min_len(),
        }
    }
}

fn default_lookback_days() -> i64 {
    30
}
fn default_size_tolerance() -> u64 {
    100
}
fn default_min_content() -> usize {
    50
}
fn default_fuzzy_min_len() -> usize {
    30
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FilterConfig {
    /// Master-collection names for the subordinate-record rule. An item
    /// whose name carries one of these tokens is rejected unless the
    /// item *is* the master collection itself. Empty disables the rule.
    #[serde(default)]
    pub master_collections: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExtractionConfig {
    /// External OCR command for image-only PDFs. Invoked with the PDF
    /// path as its final argument; recognized text is read from stdout.
    /// Unset disables the OCR fallback.
    #[serde(default)]
    pub ocr_command: Option<String>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be smaller than chunking.max_chars");
    }

    if config.sync.lookback_days < 0 {
        anyhow::bail!("sync.lookback_days must be >= 0");
    }
    if config.sync.fuzzy_min_len == 0 {
        anyhow::bail!("sync.fuzzy_min_len must be > 0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("csync.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            r#"
[repository]
root = "/tmp/docs"

[index]
path = "/tmp/index.sqlite"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.chunking.max_chars, 1000);
        assert_eq!(cfg.chunking.overlap_chars, 200);
        assert_eq!(cfg.sync.lookback_days, 30);
        assert_eq!(cfg.sync.size_tolerance_bytes, 100);
        assert_eq!(cfg.sync.min_content_chars, 50);
        assert_eq!(cfg.sync.fuzzy_min_len, 30);
        assert!(!cfg.embedding.is_enabled());
        assert!(cfg.filter.master_collections.is_empty());
    }

    #[test]
    fn overlap_must_stay_under_window() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            r#"
[repository]
root = "/tmp/docs"

[index]
path = "/tmp/index.sqlite"

[chunking]
max_chars = 100
overlap_chars = 100
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn enabled_embedding_requires_model_and_dims() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            r#"
[repository]
root = "/tmp/docs"

[index]
path = "/tmp/index.sqlite"

[embedding]
provider = "openai"
"#,
        );
        assert!(load_config(&path).is_err());
    }
}

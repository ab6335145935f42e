//! # corpus-sync CLI (`csync`)
//!
//! The `csync` binary drives the reconciliation engine against a
//! filesystem document tree and a SQLite-backed vector index.
//!
//! ## Usage
//!
//! ```bash
//! csync --config ./config/csync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `csync init` | Create the SQLite index and its schema |
//! | `csync sync` | Reconcile the repository against the index |
//! | `csync sync --dry-run` | Classify only; report intended actions |
//! | `csync verify` | Detect chunk-metadata drift from partial reindexes |
//! | `csync stats` | Print index counts and per-folder breakdowns |
//!
//! The process exits non-zero when any per-item failure occurred during
//! a sync, and when `verify` finds drifted documents.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use corpus_sync::config;
use corpus_sync::embedding::{create_embedder, DisabledEmbedder, Embedder};
use corpus_sync::extract::{CommandOcr, OcrFallback};
use corpus_sync::index_sqlite::SqliteIndex;
use corpus_sync::matcher::ContainmentMatcher;
use corpus_sync::reconcile::{run_sync, RunContext, RunLock};
use corpus_sync::repo_fs::FsRepository;
use corpus_sync::stats_cmd;

/// corpus-sync — keeps a chunk-level embedding index in sync with a
/// mutable document repository.
#[derive(Parser)]
#[command(
    name = "csync",
    about = "Keeps a chunk-level embedding index in sync with a mutable document repository",
    version,
    long_about = "corpus-sync discovers the current state of a document tree and of a vector \
    index, resolves document identity across renames, format conversions, and legacy records, \
    classifies every item as new, modified, renamed, unchanged, or deleted, and applies exactly \
    the index mutations needed to converge — without re-embedding unchanged content and without \
    leaving orphaned or duplicate chunks."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/csync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the index schema.
    ///
    /// Creates the SQLite database file and the chunk and vector tables.
    /// Idempotent — running it multiple times is safe.
    Init,

    /// Reconcile the repository against the index.
    ///
    /// Walks the document tree, loads index state, filters and
    /// de-duplicates, classifies every item, and drives the resulting
    /// writes and deletes. Exits non-zero if any per-item failure
    /// occurred.
    Sync {
        /// Classify only: report intended actions without touching the index.
        #[arg(long)]
        dry_run: bool,

        /// Skip the last-sync cutoff short-circuit and compare change
        /// signals for every matched item.
        #[arg(long)]
        full: bool,
    },

    /// Check the index for chunk-metadata drift.
    ///
    /// A document whose chunks disagree on their denormalized metadata
    /// marks a partially-failed reindex. Exits non-zero when drift is
    /// found.
    Verify,

    /// Print index statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let index = SqliteIndex::connect(&cfg.index.path).await?;
            index.init_schema().await?;
            index.close().await;
            println!("Index initialized successfully.");
        }
        Commands::Sync { dry_run, full } => {
            let repository = FsRepository::new(&cfg.repository)?;
            let index = SqliteIndex::connect(&cfg.index.path).await?;
            let matcher = ContainmentMatcher::new(cfg.sync.fuzzy_min_len);

            // Dry runs never mutate, so they skip both the lock and the
            // embedding provider.
            let embedder: Box<dyn Embedder> = if dry_run {
                Box::new(DisabledEmbedder)
            } else {
                create_embedder(&cfg.embedding)?
            };
            let _lock = if dry_run {
                None
            } else {
                Some(RunLock::acquire(&cfg.index.path.with_extension("lock"))?)
            };

            let ocr: Option<Box<dyn OcrFallback>> = cfg
                .extraction
                .ocr_command
                .clone()
                .map(|cmd| Box::new(CommandOcr::new(cmd)) as Box<dyn OcrFallback>);

            let ctx = RunContext {
                repository: &repository,
                index: &index,
                embedder: embedder.as_ref(),
                matcher: &matcher,
                ocr: ocr.as_deref(),
            };

            let report = run_sync(&cfg, &ctx, dry_run, full).await;

            index.close().await;
            // process::exit skips destructors; release the lock first
            drop(_lock);

            let report = report?;
            report.print_summary();
            if report.has_failures() {
                std::process::exit(1);
            }
        }
        Commands::Verify => {
            let drifted = stats_cmd::run_verify(&cfg).await?;
            if !drifted.is_empty() {
                std::process::exit(1);
            }
        }
        Commands::Stats => {
            stats_cmd::run_stats(&cfg).await?;
        }
    }

    Ok(())
}

//! # corpus-sync
//!
//! A reconciliation and incremental indexing engine that keeps a
//! chunk-level, embedding-backed search index synchronized with a
//! mutable, hierarchical document repository.
//!
//! One run flows through a fixed pipeline:
//!
//! ```text
//! snapshot builder ──┐
//!                    ├─► filter ─► duplicate resolver ─► change classifier ─► indexing driver
//! index state loader ┘
//! ```
//!
//! Every stage is pure given its inputs except the indexing driver,
//! which performs the only side effects: chunk deletes and writes
//! against the vector index. The engine guarantees that a converged
//! index holds no duplicate logical documents, no orphaned chunks, and
//! never re-embeds unchanged content.
//!
//! The `csync` binary wires the built-in collaborators together: a
//! filesystem repository, a SQLite-backed vector index, and HTTP
//! embedding providers. All of them sit behind traits
//! ([`repository::Repository`], [`index::VectorIndex`],
//! [`embedding::Embedder`], [`matcher::NameMatcher`]) so other backends
//! can be substituted without touching the engine.

pub mod chunk;
pub mod classify;
pub mod config;
pub mod dedup;
pub mod driver;
pub mod embedding;
pub mod extract;
pub mod filter;
pub mod index;
pub mod index_mem;
pub mod index_sqlite;
pub mod index_state;
pub mod matcher;
pub mod models;
pub mod reconcile;
pub mod repo_fs;
pub mod report;
pub mod repository;
pub mod snapshot;
pub mod stats_cmd;

//! One-way migration of snapshot directories to the current schema.
//!
//! # Invariants
//! - A directory bearing the migration marker is never touched again.
//! - `Unknown` directories are logged and left alone.
//! - Every legacy directory of a run is backed up before the first mutation;
//!   a failed backup migrates nothing.
//! - The marker is written only after the rewritten metadata is on disk.

mod backup;
mod detect;
mod engine;

pub use backup::backup_directories;
pub use detect::{ParsedSnapshot, SnapshotFormat, detect_format};
pub use engine::{MigrationEngine, MigrationReport};

use charsnap_store::StoreError;
use std::path::PathBuf;

/// Errors from a migration run.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error("backup failed at {path}: {reason}")]
    BackupFailed { path: PathBuf, reason: String },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

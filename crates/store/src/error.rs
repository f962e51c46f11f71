use charsnap_common::{ProviderError, TypeError};
use std::path::PathBuf;

/// Errors from snapshot storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("not a snapshot directory: {path} ({reason})")]
    NotASnapshot { path: PathBuf, reason: String },
    #[error("snapshot already exists: {0}")]
    SnapshotExists(PathBuf),
    #[error("corrupt file map chain at node {node}: {detail}")]
    CorruptChain { node: String, detail: String },
    #[error("unknown file map node: {0}")]
    UnknownNode(String),
    #[error(transparent)]
    InvalidValue(#[from] TypeError),
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

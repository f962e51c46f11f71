use crate::mtrl::MaterialError;
use charsnap_common::TypeError;
use charsnap_common::payload::PayloadError;
use charsnap_store::StoreError;

/// A container entry whose bytes ran out before its declared length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncatedEntry {
    /// Position of the entry in the declared file list.
    pub index: usize,
    pub declared: u64,
    pub available: u64,
}

/// Errors from import and export.
#[derive(Debug, thiserror::Error)]
pub enum InterchangeError {
    #[error("not an MCDF container")]
    BadMagic,
    #[error("unsupported container version {0}")]
    UnsupportedContainerVersion(u8),
    #[error("container header truncated")]
    TruncatedHeader,
    #[error(
        "entry {} truncated: declared {} bytes, {} available",
        .0.index,
        .0.declared,
        .0.available
    )]
    TruncatedPayload(TruncatedEntry),
    #[error("another export is already running")]
    ConcurrentExportRejected,
    #[error("material: {0}")]
    Material(#[from] MaterialError),
    #[error("payload: {0}")]
    Payload(#[from] PayloadError),
    #[error("unsupported manipulation payload version {0}")]
    UnsupportedManipulationVersion(u8),
    #[error("template: {0}")]
    Template(String),
    #[error("zip: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    InvalidValue(#[from] TypeError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

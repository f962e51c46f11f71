//! Snapshot persistence: content-addressed blobs, file-map diff chain, snapshot state.
//!
//! Layout inside a snapshot directory:
//! ```text
//! snapshot.json            - SnapshotState metadata (format version, chain, cache)
//! glamourer_history.json   - Glamourer appearance history
//! customize_history.json   - Customize+ appearance history
//! .migrated                - migration marker (presence only)
//! files/
//!   <hash>.<ext>           - preferred blob name, extension taken from a logical path
//!   <hash>.dat             - legacy blob name
//! ```
//!
//! # Invariants
//! - Blobs are write-once per hash.
//! - The chain is append-only; parents are referenced by id and resolved to
//!   arena indices, never owned.
//! - `file_replacements` always equals the effective mapping of the current node.

mod blob;
mod capture;
mod chain;
mod error;
mod history;
mod state;

pub use blob::{BlobEntry, BlobStore, FILES_DIR, LEGACY_EXTENSION, PutOutcome, hash_bytes};
pub use capture::SnapshotCapturer;
pub use chain::{FileMap, FileMapChain, FileMapDiff, FileMapNode, diff_from_current};
pub use error::StoreError;
pub use history::{AppearanceKind, HistoryEntry};
pub use state::{
    CURRENT_FORMAT_VERSION, CaptureOutcome, METADATA_FILE, MIGRATION_MARKER, SnapshotState,
    list_snapshots, load_history,
};

use crate::chain::{FileMap, FileMapChain, FileMapDiff, diff_from_current};
use crate::history::{AppearanceKind, HistoryEntry};
use crate::StoreError;
use charsnap_common::fsutil::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current on-disk schema version.
pub const CURRENT_FORMAT_VERSION: u32 = 1;
/// Primary metadata file of a snapshot directory.
pub const METADATA_FILE: &str = "snapshot.json";
/// Sentinel marking a directory as already migrated.
pub const MIGRATION_MARKER: &str = ".migrated";

/// What `capture_update` recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// A diff node was appended on top of the previous current node.
    Appended { id: String },
    /// A new root node was created (first capture, or keys were removed).
    Rebased { id: String },
    /// Nothing differed; no node was appended.
    Unchanged,
}

impl CaptureOutcome {
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::Appended { id } | Self::Rebased { id } => Some(id),
            Self::Unchanged => None,
        }
    }
}

/// Aggregate root persisted per snapshot directory.
///
/// `file_replacements` is a materialized cache of the current node's effective
/// mapping for cheap external reads; the chain is the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotState {
    #[serde(default)]
    pub format_version: u32,
    #[serde(default)]
    pub source_actor: String,
    #[serde(default)]
    pub source_world_id: Option<u32>,
    #[serde(default = "Utc::now")]
    last_update: DateTime<Utc>,
    #[serde(default)]
    file_replacements: FileMap,
    #[serde(default)]
    file_maps: FileMapChain,
    #[serde(default)]
    current_file_map_id: Option<String>,
    #[serde(default)]
    manipulation_string: String,
    #[serde(skip)]
    glamourer_history: Vec<HistoryEntry>,
    #[serde(skip)]
    customize_history: Vec<HistoryEntry>,
}

impl SnapshotState {
    /// An empty snapshot with no chain.
    pub fn new(source_actor: impl Into<String>, source_world_id: Option<u32>) -> Self {
        Self {
            format_version: CURRENT_FORMAT_VERSION,
            source_actor: source_actor.into(),
            source_world_id,
            last_update: Utc::now(),
            file_replacements: FileMap::new(),
            file_maps: FileMapChain::new(),
            current_file_map_id: None,
            manipulation_string: String::new(),
            glamourer_history: Vec::new(),
            customize_history: Vec::new(),
        }
    }

    /// Load a snapshot directory. Missing history files load as empty.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        let not_a_snapshot = |reason: String| StoreError::NotASnapshot {
            path: dir.to_path_buf(),
            reason,
        };
        let text = std::fs::read_to_string(dir.join(METADATA_FILE))
            .map_err(|e| not_a_snapshot(e.to_string()))?;
        let mut state: Self =
            serde_json::from_str(&text).map_err(|e| not_a_snapshot(e.to_string()))?;
        state.glamourer_history = read_history(&dir.join(AppearanceKind::Glamourer.file_name()))?;
        state.customize_history = read_history(&dir.join(AppearanceKind::Customize.file_name()))?;
        state.reconcile(dir)?;
        Ok(state)
    }

    /// Bring a freshly loaded state in line with the cache invariant. A
    /// dangling current id or a corrupt chain fails the load.
    fn reconcile(&mut self, dir: &Path) -> Result<(), StoreError> {
        if self.adopt_replacements()? {
            tracing::debug!(dir = %dir.display(), node = ?self.current_file_map_id, "synthesized root node");
            return Ok(());
        }
        self.refresh_replacements().inspect_err(|e| {
            tracing::warn!(dir = %dir.display(), error = %e, "file map chain does not resolve");
        })
    }

    /// Give chainless replacements a root node and make it current. Returns
    /// false when there was nothing to adopt. The root id depends only on the
    /// mapping and manipulation, so repeated loads agree on it.
    pub fn adopt_replacements(&mut self) -> Result<bool, StoreError> {
        if self.current_file_map_id.is_some()
            || !self.file_maps.is_empty()
            || self.file_replacements.is_empty()
        {
            return Ok(false);
        }
        let root = self
            .file_maps
            .append_content_root(
                self.file_replacements.clone(),
                Some(self.manipulation_string.clone()),
            )?
            .id
            .clone();
        self.current_file_map_id = Some(root);
        Ok(true)
    }

    /// Write metadata and both histories, each through an atomic rename.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<(), StoreError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        write_atomic(&dir.join(METADATA_FILE), &serde_json::to_vec_pretty(self)?)?;
        write_atomic(
            &dir.join(AppearanceKind::Glamourer.file_name()),
            &serde_json::to_vec_pretty(&self.glamourer_history)?,
        )?;
        write_atomic(
            &dir.join(AppearanceKind::Customize.file_name()),
            &serde_json::to_vec_pretty(&self.customize_history)?,
        )?;
        tracing::debug!(dir = %dir.display(), nodes = self.file_maps.len(), "saved snapshot");
        Ok(())
    }

    /// Record a new full mapping as the current state.
    ///
    /// Added or changed keys become a diff node on top of the current node.
    /// Removed keys force a new root carrying the full mapping. Identical
    /// input appends nothing.
    pub fn capture_update(
        &mut self,
        new_full_mapping: FileMap,
        manipulation: &str,
    ) -> Result<CaptureOutcome, StoreError> {
        let current = self.current_file_map_id.clone();
        let outcome = match current {
            None => self.append_root(new_full_mapping, manipulation)?,
            Some(parent) => {
                let current_mapping = self.file_maps.resolve(&parent)?;
                match diff_from_current(&new_full_mapping, &current_mapping) {
                    FileMapDiff::Rebase(full) => self.append_root(full, manipulation)?,
                    FileMapDiff::Overlay(changes) => {
                        let manipulation_changed = self.manipulation_at(&parent)? != manipulation;
                        if changes.is_empty() && !manipulation_changed {
                            self.last_update = Utc::now();
                            tracing::debug!(node = %parent, "capture unchanged");
                            return Ok(CaptureOutcome::Unchanged);
                        }
                        let id = self
                            .file_maps
                            .append(
                                Some(parent.as_str()),
                                changes,
                                manipulation_changed.then(|| manipulation.to_string()),
                            )?
                            .id
                            .clone();
                        CaptureOutcome::Appended { id }
                    }
                }
            }
        };
        self.current_file_map_id = outcome.node_id().map(str::to_string);
        self.manipulation_string = manipulation.to_string();
        self.last_update = Utc::now();
        self.refresh_replacements()?;
        Ok(outcome)
    }

    fn append_root(&mut self, full: FileMap, manipulation: &str) -> Result<CaptureOutcome, StoreError> {
        let id = self
            .file_maps
            .append(None, full, Some(manipulation.to_string()))?
            .id
            .clone();
        Ok(CaptureOutcome::Rebased { id })
    }

    /// Point the snapshot at another node and recompute the cache.
    pub fn checkout(&mut self, node_id: &str) -> Result<(), StoreError> {
        let mapping = self.file_maps.resolve(node_id)?;
        self.manipulation_string = self.manipulation_at(node_id)?;
        self.current_file_map_id = Some(node_id.to_string());
        self.file_replacements = mapping;
        self.last_update = Utc::now();
        Ok(())
    }

    /// Recompute `file_replacements` from the current node.
    pub fn refresh_replacements(&mut self) -> Result<(), StoreError> {
        self.file_replacements = match &self.current_file_map_id {
            Some(id) => self.file_maps.resolve(id)?,
            None => FileMap::new(),
        };
        Ok(())
    }

    /// Effective mapping of any node.
    pub fn effective_mapping(&self, node_id: &str) -> Result<FileMap, StoreError> {
        self.file_maps.resolve(node_id)
    }

    /// Manipulation payload in effect at a node. Falls back to the snapshot's
    /// own string when no node on the path carries an override.
    pub fn manipulation_at(&self, node_id: &str) -> Result<String, StoreError> {
        Ok(self
            .file_maps
            .resolve_manipulation(node_id)?
            .unwrap_or_else(|| self.manipulation_string.clone()))
    }

    pub fn record_appearance(&mut self, kind: AppearanceKind, entry: HistoryEntry) {
        match kind {
            AppearanceKind::Glamourer => self.glamourer_history.push(entry),
            AppearanceKind::Customize => self.customize_history.push(entry),
        }
    }

    pub fn history(&self, kind: AppearanceKind) -> &[HistoryEntry] {
        match kind {
            AppearanceKind::Glamourer => &self.glamourer_history,
            AppearanceKind::Customize => &self.customize_history,
        }
    }

    pub fn file_replacements(&self) -> &FileMap {
        &self.file_replacements
    }

    pub fn file_maps(&self) -> &FileMapChain {
        &self.file_maps
    }

    pub fn current_file_map_id(&self) -> Option<&str> {
        self.current_file_map_id.as_deref()
    }

    pub fn manipulation_string(&self) -> &str {
        &self.manipulation_string
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }
}

/// Read one history file of a snapshot directory; missing means empty.
pub fn load_history(dir: &Path, kind: AppearanceKind) -> Result<Vec<HistoryEntry>, StoreError> {
    read_history(&dir.join(kind.file_name()))
}

fn read_history(path: &Path) -> Result<Vec<HistoryEntry>, StoreError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Snapshot directories under `root` (subdirectories holding a metadata
/// file), sorted by path. A missing root has no snapshots.
pub fn list_snapshots(root: impl AsRef<Path>) -> Result<Vec<PathBuf>, StoreError> {
    let read_dir = match std::fs::read_dir(root.as_ref()) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut dirs = Vec::new();
    for entry in read_dir {
        let path = entry?.path();
        if path.is_dir() && path.join(METADATA_FILE).is_file() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

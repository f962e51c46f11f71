//! PMP mod-pack export.
//!
//! Archive layout:
//! ```text
//! meta.json           mod metadata
//! default_mod.json    Files (game path -> archive path), FileSwaps, Manipulations
//! files/<blob name>   one copy per blob, named as in the snapshot
//! ```

use crate::InterchangeError;
use crate::manip::manipulations_from_payload;
use crate::mtrl::MaterialFile;
use charsnap_common::fsutil::sanitize_file_name;
use charsnap_common::{BlobHash, CoreEvent, EventSink, GamePath, NotifyLevel};
use charsnap_store::{BlobStore, FILES_DIR, FileMap, SnapshotState, StoreError};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

pub const PMP_EXTENSION: &str = "pmp";
const PMP_FILE_VERSION: u32 = 3;
const MATERIAL_EXTENSION: &str = "mtrl";

/// What to export and where.
#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    pub snapshot_dir: PathBuf,
    /// Chain node to export; the current node when unset.
    pub node_id: Option<String>,
    /// Replaces chain resolution entirely.
    pub mapping_override: Option<FileMap>,
    pub manipulation_override: Option<String>,
    /// Restrict the export to these paths (plus the textures their materials need).
    pub selection: Option<BTreeSet<GamePath>>,
    pub mod_name: Option<String>,
    pub output_dir: PathBuf,
}

impl ExportRequest {
    pub fn new(snapshot_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_dir: snapshot_dir.into(),
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    pub fn at_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn with_selection(mut self, selection: impl IntoIterator<Item = GamePath>) -> Self {
        self.selection = Some(selection.into_iter().collect());
        self
    }

    pub fn with_mapping(mut self, mapping: FileMap) -> Self {
        self.mapping_override = Some(mapping);
        self
    }

    pub fn with_manipulation(mut self, manipulation: impl Into<String>) -> Self {
        self.manipulation_override = Some(manipulation.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.mod_name = Some(name.into());
        self
    }
}

/// Outcome of a finished export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub archive: PathBuf,
    /// Blob files written into the archive.
    pub blobs: usize,
    /// Game paths listed in the manifest.
    pub paths: usize,
    /// Mapped paths whose blob file is missing from the snapshot.
    pub missing: Vec<GamePath>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ModMeta<'a> {
    file_version: u32,
    name: &'a str,
    author: &'a str,
    description: String,
    version: &'a str,
    website: &'a str,
    mod_tags: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DefaultMod {
    name: String,
    description: String,
    priority: i32,
    files: BTreeMap<String, String>,
    file_swaps: BTreeMap<String, String>,
    manipulations: Vec<Value>,
}

/// Writes snapshots out as PMP archives, one export at a time.
pub struct ExportCodec<'a> {
    author: String,
    sink: &'a dyn EventSink,
    busy: AtomicBool,
}

impl<'a> ExportCodec<'a> {
    pub fn new(author: impl Into<String>, sink: &'a dyn EventSink) -> Self {
        Self {
            author: author.into(),
            sink,
            busy: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Run an export. A request arriving while another is in flight is
    /// rejected, not queued. A partially written archive is left on disk.
    pub fn export(&self, request: &ExportRequest) -> Result<ExportReport, InterchangeError> {
        let Some(_guard) = BusyGuard::acquire(&self.busy) else {
            tracing::warn!(dir = %request.snapshot_dir.display(), "export already running; request rejected");
            self.sink.publish(CoreEvent::notify(
                NotifyLevel::Warning,
                "An export is already running",
            ));
            return Err(InterchangeError::ConcurrentExportRejected);
        };
        match self.write_archive(request) {
            Ok(report) => {
                tracing::info!(
                    archive = %report.archive.display(),
                    blobs = report.blobs,
                    paths = report.paths,
                    "exported mod pack"
                );
                self.sink.publish(CoreEvent::notify(
                    NotifyLevel::Success,
                    format!("Exported {}", report.archive.display()),
                ));
                Ok(report)
            }
            Err(e) => {
                tracing::error!(dir = %request.snapshot_dir.display(), error = %e, "export failed");
                self.sink
                    .publish(CoreEvent::notify(NotifyLevel::Error, format!("Export failed: {e}")));
                Err(e)
            }
        }
    }

    fn write_archive(&self, request: &ExportRequest) -> Result<ExportReport, InterchangeError> {
        let dir = &request.snapshot_dir;
        let state = SnapshotState::load(dir)?;
        let blobs = BlobStore::new(dir);
        let node = request
            .node_id
            .as_deref()
            .or(state.current_file_map_id());

        let mut mapping = match &request.mapping_override {
            Some(mapping) => mapping.clone(),
            None => resolve_mapping(&state, node)?,
        };
        let manipulation = match &request.manipulation_override {
            Some(m) => m.clone(),
            None => resolve_manipulation(&state, node)?,
        };
        if let Some(selection) = &request.selection {
            let selected = expand_selection(&blobs, &mapping, selection)?;
            mapping.retain(|path, _| selected.contains(path));
        }
        let manipulations = manipulations_from_payload(&manipulation)?;

        let name = export_name(request, &state);
        std::fs::create_dir_all(&request.output_dir)?;
        let archive = request
            .output_dir
            .join(format!("{}.{PMP_EXTENSION}", sanitize_file_name(&name)));
        let mut zip = ZipWriter::new(File::create(&archive)?);
        let options = SimpleFileOptions::default();

        let snapshot_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let meta = ModMeta {
            file_version: PMP_FILE_VERSION,
            name: &name,
            author: &self.author,
            description: format!(
                "Exported from snapshot {snapshot_name} on {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
            ),
            version: "1.0.0",
            website: "",
            mod_tags: Vec::new(),
        };
        zip.start_file("meta.json", options)?;
        zip.write_all(&serde_json::to_vec_pretty(&meta)?)?;

        let mut by_hash: BTreeMap<&BlobHash, Vec<&GamePath>> = BTreeMap::new();
        for (path, hash) in &mapping {
            by_hash.entry(hash).or_default().push(path);
        }
        let mut files = BTreeMap::new();
        let mut emitted: HashSet<BlobHash> = HashSet::new();
        for entry in blobs.entries()? {
            let Some(paths) = by_hash.get(&entry.hash) else {
                continue;
            };
            if !emitted.insert(entry.hash.clone()) {
                continue;
            }
            zip.start_file(format!("{FILES_DIR}/{}", entry.file_name), options)?;
            zip.write_all(&std::fs::read(&entry.path)?)?;
            for path in paths {
                files.insert(
                    path.as_str().to_string(),
                    format!("{FILES_DIR}\\{}", entry.file_name),
                );
            }
        }
        let missing: Vec<GamePath> = mapping
            .iter()
            .filter(|(_, hash)| !emitted.contains(*hash))
            .map(|(path, _)| path.clone())
            .collect();
        for path in &missing {
            tracing::warn!(path = %path, "no blob file for mapped path; left out of export");
        }

        let default_mod = DefaultMod {
            name: String::new(),
            description: String::new(),
            priority: 0,
            files,
            file_swaps: BTreeMap::new(),
            manipulations,
        };
        let paths = default_mod.files.len();
        zip.start_file("default_mod.json", options)?;
        zip.write_all(&serde_json::to_vec_pretty(&default_mod)?)?;
        zip.finish()?;

        Ok(ExportReport {
            archive,
            blobs: emitted.len(),
            paths,
            missing,
        })
    }
}

/// Clears the in-flight flag however the export ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn resolve_mapping(state: &SnapshotState, node: Option<&str>) -> Result<FileMap, InterchangeError> {
    let Some(node) = node else {
        tracing::warn!("snapshot has no current node; exporting an empty mapping");
        return Ok(FileMap::new());
    };
    match state.effective_mapping(node) {
        Ok(mapping) => Ok(mapping),
        Err(StoreError::UnknownNode(id)) => {
            tracing::warn!(node = %id, "unknown node; exporting an empty mapping");
            Ok(FileMap::new())
        }
        Err(e) => Err(e.into()),
    }
}

fn resolve_manipulation(state: &SnapshotState, node: Option<&str>) -> Result<String, InterchangeError> {
    let Some(node) = node else {
        return Ok(state.manipulation_string().to_string());
    };
    match state.manipulation_at(node) {
        Ok(m) => Ok(m),
        Err(StoreError::UnknownNode(_)) => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

/// The selection plus every texture a selected material references that the
/// mapping can supply.
fn expand_selection(
    blobs: &BlobStore,
    mapping: &FileMap,
    selection: &BTreeSet<GamePath>,
) -> Result<BTreeSet<GamePath>, InterchangeError> {
    let mut expanded = selection.clone();
    for path in selection.iter().filter(|p| p.has_extension(MATERIAL_EXTENSION)) {
        let Some(hash) = mapping.get(path) else {
            continue;
        };
        let Some(bytes) = blobs.read(hash, Some(path))? else {
            tracing::warn!(path = %path, hash = %hash, "material blob missing; textures not expanded");
            continue;
        };
        let material = MaterialFile::parse(&bytes)?;
        for candidate in material.texture_candidates() {
            if mapping.contains_key(&candidate) && expanded.insert(candidate.clone()) {
                tracing::debug!(material = %path, texture = %candidate, "added texture dependency");
            }
        }
    }
    Ok(expanded)
}

fn export_name(request: &ExportRequest, state: &SnapshotState) -> String {
    let candidates = [
        request.mod_name.clone(),
        Some(state.source_actor.clone()),
        request
            .snapshot_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned()),
    ];
    candidates
        .into_iter()
        .flatten()
        .find(|n| !sanitize_file_name(n).is_empty())
        .unwrap_or_else(|| "snapshot".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use charsnap_common::NullSink;

    #[test]
    fn second_export_is_rejected_while_busy() {
        let sink = NullSink;
        let codec = ExportCodec::new("me", &sink);
        let _held = BusyGuard::acquire(&codec.busy).unwrap();
        let request = ExportRequest::new("nowhere", "out");
        assert!(matches!(
            codec.export(&request),
            Err(InterchangeError::ConcurrentExportRejected)
        ));
        assert!(codec.is_busy());
    }

    #[test]
    fn guard_is_released_after_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = NullSink;
        let codec = ExportCodec::new("me", &sink);
        let request = ExportRequest::new(tmp.path().join("missing"), tmp.path().join("out"));
        assert!(matches!(
            codec.export(&request),
            Err(InterchangeError::Store(StoreError::NotASnapshot { .. }))
        ));
        assert!(!codec.is_busy());
    }

    #[test]
    fn name_falls_back_to_actor_then_directory() {
        let state = SnapshotState::new("Hero", None);
        let request = ExportRequest::new("snaps/dir", "out");
        assert_eq!(export_name(&request, &state), "Hero");
        assert_eq!(export_name(&request.clone().named("Pack"), &state), "Pack");
        let nameless = SnapshotState::new("", None);
        assert_eq!(export_name(&request, &nameless), "dir");
    }
}

use crate::MigrateError;
use crate::backup::backup_directories;
use crate::detect::{ParsedSnapshot, read_document};
use charsnap_common::fsutil::write_atomic;
use charsnap_common::{BlobHash, CoreEvent, EventSink, GamePath, NotifyLevel};
use charsnap_store::{
    AppearanceKind, CURRENT_FORMAT_VERSION, FileMap, HistoryEntry, METADATA_FILE,
    MIGRATION_MARKER, SnapshotState, list_snapshots, load_history,
};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// What one migration pass did, per directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Directories carrying the marker; never inspected.
    pub skipped_marked: Vec<PathBuf>,
    pub up_to_date: Vec<PathBuf>,
    /// Unversioned directories that received a version stamp.
    pub stamped: Vec<PathBuf>,
    /// Legacy directories rewritten into the chain schema.
    pub migrated: Vec<PathBuf>,
    pub unknown: Vec<PathBuf>,
    /// Directories whose rewrite failed after the backup succeeded.
    pub failed: Vec<(PathBuf, String)>,
    pub backup: Option<PathBuf>,
}

impl MigrationReport {
    /// True when any directory on disk was rewritten.
    pub fn changed(&self) -> bool {
        !self.stamped.is_empty() || !self.migrated.is_empty()
    }
}

/// Upgrades every snapshot directory under a root to the current schema.
pub struct MigrationEngine<'a> {
    backup_dir: PathBuf,
    sink: &'a dyn EventSink,
}

impl<'a> MigrationEngine<'a> {
    pub fn new(backup_dir: impl Into<PathBuf>, sink: &'a dyn EventSink) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            sink,
        }
    }

    /// Run one pass over `root`. Only a failed backup aborts the pass, and it
    /// does so before anything is rewritten.
    pub fn run(&self, root: &Path) -> Result<MigrationReport, MigrateError> {
        let mut report = MigrationReport::default();
        let mut unversioned = Vec::new();
        let mut legacy = Vec::new();

        for dir in list_snapshots(root)? {
            if dir.join(MIGRATION_MARKER).exists() {
                tracing::debug!(dir = %dir.display(), "already migrated");
                report.skipped_marked.push(dir);
                continue;
            }
            let parsed = read_document(&dir.join(METADATA_FILE))
                .map(|doc| (ParsedSnapshot::parse(&doc), doc));
            match parsed {
                Some((ParsedSnapshot::Versioned, _)) => report.up_to_date.push(dir),
                Some((ParsedSnapshot::Unversioned, doc)) => unversioned.push((dir, doc)),
                Some((ParsedSnapshot::Legacy(entries), doc)) => legacy.push((dir, doc, entries)),
                Some((ParsedSnapshot::Unrecognized(reason), _)) => {
                    tracing::warn!(dir = %dir.display(), %reason, "unrecognized snapshot format; leaving untouched");
                    report.unknown.push(dir);
                }
                None => {
                    tracing::warn!(dir = %dir.display(), "unreadable snapshot metadata; leaving untouched");
                    report.unknown.push(dir);
                }
            }
        }

        if !legacy.is_empty() {
            let dirs: Vec<PathBuf> = legacy.iter().map(|(dir, _, _)| dir.clone()).collect();
            match backup_directories(&dirs, &self.backup_dir) {
                Ok(archive) => report.backup = Some(archive),
                Err(e) => {
                    tracing::error!(error = %e, "migration backup failed; nothing was migrated");
                    self.sink.publish(CoreEvent::notify(
                        NotifyLevel::Error,
                        format!("Snapshot migration aborted: {e}"),
                    ));
                    return Err(e);
                }
            }
        }

        for (dir, doc) in unversioned {
            match stamp_version(&dir, doc) {
                Ok(()) => {
                    tracing::info!(dir = %dir.display(), "stamped format version");
                    report.stamped.push(dir);
                }
                Err(e) => {
                    tracing::error!(dir = %dir.display(), error = %e, "version stamp failed");
                    report.failed.push((dir, e.to_string()));
                }
            }
        }

        for (dir, doc, entries) in legacy {
            match migrate_legacy(&dir, &doc, entries) {
                Ok(()) => {
                    tracing::info!(dir = %dir.display(), "migrated legacy snapshot");
                    report.migrated.push(dir);
                }
                Err(e) => {
                    tracing::error!(dir = %dir.display(), error = %e, "legacy migration failed");
                    report.failed.push((dir, e.to_string()));
                }
            }
        }

        if report.changed() {
            self.sink.publish(CoreEvent::SnapshotsChanged);
        }
        if !report.failed.is_empty() {
            self.sink.publish(CoreEvent::notify(
                NotifyLevel::Warning,
                format!("{} snapshot(s) could not be migrated", report.failed.len()),
            ));
        }
        tracing::info!(
            migrated = report.migrated.len(),
            stamped = report.stamped.len(),
            unknown = report.unknown.len(),
            failed = report.failed.len(),
            "migration pass finished"
        );
        Ok(report)
    }
}

/// Add the version field to an otherwise current document, plus a persisted
/// root node when the document has replacements but no chain. Every other key
/// is kept as written.
fn stamp_version(dir: &Path, mut doc: Value) -> Result<(), MigrateError> {
    let mut state: SnapshotState = serde_json::from_value(doc.clone())?;
    let adopted = state.adopt_replacements()?;
    if let Some(obj) = doc.as_object_mut() {
        obj.insert("format_version".into(), CURRENT_FORMAT_VERSION.into());
        if adopted {
            obj.insert("file_maps".into(), serde_json::to_value(state.file_maps())?);
            obj.insert("current_file_map_id".into(), state.current_file_map_id().into());
        }
    }
    write_atomic(&dir.join(METADATA_FILE), &serde_json::to_vec_pretty(&doc)?)?;
    Ok(())
}

fn migrate_legacy(
    dir: &Path,
    doc: &Value,
    entries: Vec<(BlobHash, Vec<GamePath>)>,
) -> Result<(), MigrateError> {
    let mut mapping = FileMap::new();
    for (hash, paths) in entries {
        for path in paths {
            if let Some(previous) = mapping.insert(path.clone(), hash.clone()) {
                tracing::debug!(path = %path, %previous, replacement = %hash, "path listed under two hashes");
            }
        }
    }

    let world = doc
        .get("source_world_id")
        .and_then(Value::as_u64)
        .and_then(|w| u32::try_from(w).ok());
    let mut state = SnapshotState::new(text(doc, "source_actor"), world);
    state.capture_update(mapping, text(doc, "manipulation_string"))?;
    let root = state.current_file_map_id().map(str::to_string);

    for (kind, legacy_key) in [
        (AppearanceKind::Glamourer, "glamourer_string"),
        (AppearanceKind::Customize, "customize_data"),
    ] {
        for entry in load_history(dir, kind)? {
            state.record_appearance(kind, entry);
        }
        let payload = text(doc, legacy_key);
        if !payload.is_empty() {
            state.record_appearance(
                kind,
                HistoryEntry::new("Migrated from legacy snapshot", payload).linked_to(root.clone()),
            );
        }
    }

    state.save(dir)?;
    write_atomic(&dir.join(MIGRATION_MARKER), b"")?;
    Ok(())
}

fn text<'a>(doc: &'a Value, key: &str) -> &'a str {
    doc.get(key).and_then(Value::as_str).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use charsnap_common::NullSink;
    use serde_json::json;

    #[test]
    fn legacy_document_becomes_single_root() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = json!({
            "source_actor": "Hero",
            "source_world_id": 40,
            "manipulation_string": "manip",
            "glamourer_string": "glam",
            "file_replacements": {"0a": ["chara/a.tex", "chara/b.tex"], "0b": ["chara/c.mtrl"]}
        });
        let ParsedSnapshot::Legacy(entries) = ParsedSnapshot::parse(&doc) else {
            panic!("expected legacy shape");
        };
        migrate_legacy(tmp.path(), &doc, entries).unwrap();

        let state = SnapshotState::load(tmp.path()).unwrap();
        assert_eq!(state.source_actor, "Hero");
        assert_eq!(state.source_world_id, Some(40));
        assert_eq!(state.file_maps().len(), 1);
        assert_eq!(state.file_replacements().len(), 3);
        let root = state.current_file_map_id().unwrap();
        assert_eq!(state.manipulation_at(root).unwrap(), "manip");

        let glam = state.history(AppearanceKind::Glamourer);
        assert_eq!(glam.len(), 1);
        assert_eq!(glam[0].payload, "glam");
        assert_eq!(glam[0].file_map_id.as_deref(), Some(root));
        assert!(state.history(AppearanceKind::Customize).is_empty());
        assert!(tmp.path().join(MIGRATION_MARKER).exists());
    }

    #[test]
    fn stamping_keeps_other_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = json!({"source_actor": "A", "file_replacements": {"chara/a.tex": "0a"}, "extra": 7});
        std::fs::write(tmp.path().join(METADATA_FILE), doc.to_string()).unwrap();
        stamp_version(tmp.path(), doc).unwrap();

        let written: Value =
            serde_json::from_slice(&std::fs::read(tmp.path().join(METADATA_FILE)).unwrap()).unwrap();
        assert_eq!(written["format_version"], json!(1));
        assert_eq!(written["extra"], json!(7));
        assert_eq!(written["file_replacements"]["chara/a.tex"], json!("0a"));
        assert!(!tmp.path().join(MIGRATION_MARKER).exists());

        let root = written["current_file_map_id"].as_str().unwrap();
        assert_eq!(written["file_maps"][0]["id"], json!(root));
        let first = SnapshotState::load(tmp.path()).unwrap();
        let second = SnapshotState::load(tmp.path()).unwrap();
        assert_eq!(first.current_file_map_id(), Some(root));
        assert_eq!(second.current_file_map_id(), Some(root));
        assert_eq!(first.file_replacements().len(), 1);
    }

    #[test]
    fn empty_root_reports_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = NullSink;
        let engine = MigrationEngine::new(tmp.path().join("backups"), &sink);
        let report = engine.run(&tmp.path().join("missing")).unwrap();
        assert_eq!(report, MigrationReport::default());
        assert!(!report.changed());
    }
}

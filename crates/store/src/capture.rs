use crate::blob::BlobStore;
use crate::chain::FileMap;
use crate::history::{AppearanceKind, HistoryEntry};
use crate::state::{CaptureOutcome, METADATA_FILE, SnapshotState};
use crate::StoreError;
use charsnap_common::fsutil::sanitize_file_name;
use charsnap_common::{
    ActorRef, AppearanceProvider, CoreEvent, EventSink, ManipulationProvider, NotifyLevel,
};
use std::path::{Path, PathBuf};

/// Live capture: pulls the actor's state from the host collaborators and
/// records it into a snapshot directory.
pub struct SnapshotCapturer<'a> {
    resources: &'a dyn ManipulationProvider,
    appearance: &'a dyn AppearanceProvider,
    sink: &'a dyn EventSink,
}

impl<'a> SnapshotCapturer<'a> {
    pub fn new(
        resources: &'a dyn ManipulationProvider,
        appearance: &'a dyn AppearanceProvider,
        sink: &'a dyn EventSink,
    ) -> Self {
        Self {
            resources,
            appearance,
            sink,
        }
    }

    /// Create a fresh snapshot under `root`, named after `name` or the actor.
    pub fn create(
        &self,
        root: &Path,
        actor: &ActorRef,
        name: Option<&str>,
    ) -> Result<PathBuf, StoreError> {
        let dir_name = sanitize_file_name(name.unwrap_or(&actor.name));
        let dir_name = if dir_name.is_empty() {
            format!("snapshot_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S"))
        } else {
            dir_name
        };
        let dir = root.join(dir_name);
        if dir.join(METADATA_FILE).exists() {
            return Err(StoreError::SnapshotExists(dir));
        }
        let mut state = SnapshotState::new(actor.name.clone(), actor.world_id);
        self.record(&dir, &mut state, actor)?;
        tracing::info!(dir = %dir.display(), actor = %actor.name, "created snapshot");
        self.sink.publish(CoreEvent::notify(
            NotifyLevel::Success,
            format!("Snapshot created for {}", actor.name),
        ));
        self.sink.publish(CoreEvent::SnapshotsChanged);
        Ok(dir)
    }

    /// Append the actor's current state to an existing snapshot.
    pub fn update(&self, dir: &Path, actor: &ActorRef) -> Result<CaptureOutcome, StoreError> {
        let mut state = SnapshotState::load(dir)?;
        let outcome = self.record(dir, &mut state, actor)?;
        tracing::info!(dir = %dir.display(), ?outcome, "updated snapshot");
        self.sink.publish(CoreEvent::notify(
            NotifyLevel::Success,
            format!("Snapshot updated for {}", actor.name),
        ));
        self.sink.publish(CoreEvent::SnapshotsChanged);
        Ok(outcome)
    }

    fn record(
        &self,
        dir: &Path,
        state: &mut SnapshotState,
        actor: &ActorRef,
    ) -> Result<CaptureOutcome, StoreError> {
        let live = self.resources.current_resources(actor)?;
        let blobs = BlobStore::new(dir);
        let mut mapping = FileMap::new();
        for (path, source) in &live.files {
            let bytes = std::fs::read(source)?;
            let put = blobs.put(&bytes, Some(path))?;
            mapping.insert(path.clone(), put.hash);
        }
        let outcome = state.capture_update(mapping, &live.manipulation)?;
        let node = state.current_file_map_id().map(str::to_string);

        let glamourer = self.appearance.glamourer_state(actor)?;
        let customize = self.appearance.customize_state(actor)?;
        for (kind, payload) in [
            (AppearanceKind::Glamourer, glamourer),
            (AppearanceKind::Customize, customize),
        ] {
            let Some(payload) = payload else { continue };
            let unchanged = state
                .history(kind)
                .last()
                .is_some_and(|last| last.payload == payload && last.file_map_id == node);
            if unchanged {
                continue;
            }
            let description = format!("Captured {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"));
            state.record_appearance(
                kind,
                HistoryEntry::new(description, payload).linked_to(node.clone()),
            );
        }

        state.save(dir)?;
        Ok(outcome)
    }
}

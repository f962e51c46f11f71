//! MCDF character data container.
//!
//! ```text
//! zstd(
//!   "MCDF" | version: u8 | meta_len: u32 LE | meta JSON | payload bytes...
//! )
//! ```
//! Payload bytes are the file entries' contents concatenated in declared
//! order, each exactly `Length` bytes long.

use crate::error::{InterchangeError, TruncatedEntry};
use crate::template::derive_template;
use byteorder::{ByteOrder, LittleEndian};
use charsnap_common::fsutil::sanitize_file_name;
use charsnap_common::{CoreEvent, EventSink, GamePath, NotifyLevel};
use charsnap_store::{AppearanceKind, BlobStore, FileMap, HistoryEntry, SnapshotState};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MCDF_MAGIC: [u8; 4] = *b"MCDF";
pub const MCDF_VERSION: u8 = 1;
const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct McdfMetadata {
    pub description: String,
    pub glamourer_data: String,
    pub customize_plus_data: String,
    pub manipulation_data: String,
    pub files: Vec<McdfFileEntry>,
    pub file_swaps: Vec<McdfFileSwap>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct McdfFileEntry {
    pub game_paths: Vec<String>,
    pub length: u64,
    /// Producer's own content hash; informational only.
    pub hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct McdfFileSwap {
    pub game_paths: Vec<String>,
    pub file_swap_path: String,
}

/// A decompressed container: metadata plus the raw payload region.
#[derive(Debug, Clone, PartialEq)]
pub struct McdfContainer {
    pub metadata: McdfMetadata,
    pub payload: Vec<u8>,
}

impl McdfContainer {
    /// Build a container whose file entries declare exactly the given blobs.
    pub fn from_files(mut metadata: McdfMetadata, files: Vec<(Vec<String>, Vec<u8>)>) -> Self {
        let mut payload = Vec::new();
        metadata.files = files
            .into_iter()
            .map(|(game_paths, bytes)| {
                payload.extend_from_slice(&bytes);
                McdfFileEntry {
                    game_paths,
                    length: bytes.len() as u64,
                    hash: charsnap_store::hash_bytes(&bytes).to_string(),
                }
            })
            .collect();
        Self { metadata, payload }
    }

    pub fn encode(&self) -> Result<Vec<u8>, InterchangeError> {
        let meta = serde_json::to_vec(&self.metadata)?;
        let meta_len = u32::try_from(meta.len())
            .map_err(|_| InterchangeError::Io(std::io::Error::other("metadata too large")))?;
        let mut raw = Vec::with_capacity(9 + meta.len() + self.payload.len());
        raw.extend_from_slice(&MCDF_MAGIC);
        raw.push(MCDF_VERSION);
        let mut len = [0u8; 4];
        LittleEndian::write_u32(&mut len, meta_len);
        raw.extend_from_slice(&len);
        raw.extend_from_slice(&meta);
        raw.extend_from_slice(&self.payload);
        Ok(zstd::encode_all(raw.as_slice(), ZSTD_LEVEL)?)
    }

    pub fn decode(compressed: &[u8]) -> Result<Self, InterchangeError> {
        let raw = zstd::decode_all(compressed)?;
        if raw.len() < 4 || raw[..4] != MCDF_MAGIC {
            return Err(InterchangeError::BadMagic);
        }
        let version = *raw.get(4).ok_or(InterchangeError::TruncatedHeader)?;
        if version != MCDF_VERSION {
            return Err(InterchangeError::UnsupportedContainerVersion(version));
        }
        let len_bytes = raw.get(5..9).ok_or(InterchangeError::TruncatedHeader)?;
        let meta_len = LittleEndian::read_u32(len_bytes) as usize;
        let meta_end = 9usize
            .checked_add(meta_len)
            .filter(|end| *end <= raw.len())
            .ok_or(InterchangeError::TruncatedHeader)?;
        let metadata = serde_json::from_slice(&raw[9..meta_end])?;
        Ok(Self {
            metadata,
            payload: raw[meta_end..].to_vec(),
        })
    }

    /// Split the payload into entries. Stops at the first short entry, since
    /// every later boundary would be misaligned.
    pub fn entries(&self) -> (Vec<(&McdfFileEntry, &[u8])>, Option<TruncatedEntry>) {
        let mut out = Vec::with_capacity(self.metadata.files.len());
        let mut offset = 0usize;
        for (index, entry) in self.metadata.files.iter().enumerate() {
            let available = self.payload.len() - offset;
            let complete = usize::try_from(entry.length)
                .ok()
                .filter(|len| *len <= available);
            let Some(len) = complete else {
                return (
                    out,
                    Some(TruncatedEntry {
                        index,
                        declared: entry.length,
                        available: available as u64,
                    }),
                );
            };
            out.push((entry, &self.payload[offset..offset + len]));
            offset += len;
        }
        (out, None)
    }
}

/// Outcome of a successful import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    pub dir: PathBuf,
    pub root_node: Option<String>,
    pub blobs_written: usize,
    pub mapped_paths: usize,
    pub truncated: Option<TruncatedEntry>,
    /// File swaps present in the container; redirects are not carried.
    pub ignored_swaps: usize,
}

/// Turns MCDF files into new snapshot directories.
pub struct McdfImporter<'a> {
    sink: &'a dyn EventSink,
}

impl<'a> McdfImporter<'a> {
    pub fn new(sink: &'a dyn EventSink) -> Self {
        Self { sink }
    }

    pub fn import_file(&self, file: &Path, root: &Path) -> Result<ImportReport, InterchangeError> {
        let bytes = std::fs::read(file).map_err(|e| self.fail(e.into()))?;
        tracing::debug!(file = %file.display(), len = bytes.len(), "read MCDF file");
        self.import(&bytes, root)
    }

    /// Import container bytes into a new directory under `root`. A partially
    /// written directory stays on disk when this fails.
    pub fn import(&self, bytes: &[u8], root: &Path) -> Result<ImportReport, InterchangeError> {
        self.extract(bytes, root).map_err(|e| self.fail(e))
    }

    fn fail(&self, e: InterchangeError) -> InterchangeError {
        tracing::error!(error = %e, "MCDF import failed");
        self.sink
            .publish(CoreEvent::notify(NotifyLevel::Error, format!("Import failed: {e}")));
        e
    }

    fn extract(&self, bytes: &[u8], root: &Path) -> Result<ImportReport, InterchangeError> {
        let container = McdfContainer::decode(bytes)?;
        let meta = &container.metadata;
        let dir = root.join(directory_name(&meta.description));
        if dir.exists() {
            tracing::info!(dir = %dir.display(), "replacing existing snapshot directory");
            std::fs::remove_dir_all(&dir)?;
        }
        std::fs::create_dir_all(&dir)?;

        let blobs = BlobStore::new(&dir);
        let (entries, truncated) = container.entries();
        if let Some(t) = truncated {
            tracing::warn!(error = %InterchangeError::TruncatedPayload(t), "skipping remaining entries");
        }
        let mut mapping = FileMap::new();
        let mut blobs_written = 0;
        for (entry, data) in entries {
            let aliases: Vec<GamePath> = entry
                .game_paths
                .iter()
                .filter_map(|raw| match GamePath::new(raw) {
                    Ok(path) => Some(path),
                    Err(e) => {
                        tracing::warn!(path = %raw, error = %e, "skipping unusable game path");
                        None
                    }
                })
                .collect();
            let put = blobs.put(data, aliases.first())?;
            if put.written {
                blobs_written += 1;
            }
            for alias in aliases {
                mapping.insert(alias, put.hash.clone());
            }
        }
        if !meta.file_swaps.is_empty() {
            tracing::info!(swaps = meta.file_swaps.len(), "file swaps are not carried into snapshots");
        }

        let mapped_paths = mapping.len();
        let actor = if meta.description.trim().is_empty() {
            "Imported".to_string()
        } else {
            meta.description.trim().to_string()
        };
        let mut state = SnapshotState::new(actor, None);
        state.capture_update(mapping, &meta.manipulation_data)?;
        let root_node = state.current_file_map_id().map(str::to_string);

        let description = format!("Imported {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"));
        state.record_appearance(
            AppearanceKind::Glamourer,
            HistoryEntry::new(description.clone(), meta.glamourer_data.clone())
                .linked_to(root_node.clone()),
        );
        let template = if meta.customize_plus_data.trim().is_empty() {
            None
        } else {
            derive_template(&meta.customize_plus_data, &state.source_actor)
                .map_err(|e| tracing::warn!(error = %e, "could not derive Customize+ template"))
                .ok()
        };
        state.record_appearance(
            AppearanceKind::Customize,
            HistoryEntry::new(description, meta.customize_plus_data.clone())
                .linked_to(root_node.clone())
                .with_template(template),
        );
        state.save(&dir)?;

        tracing::info!(dir = %dir.display(), paths = mapped_paths, blobs = blobs_written, "imported MCDF");
        self.sink.publish(CoreEvent::SnapshotsChanged);
        let message = match truncated {
            Some(t) => format!(
                "Imported {} with {} files; entries from #{} on were truncated",
                state.source_actor,
                mapped_paths,
                t.index
            ),
            None => format!("Imported {} with {} files", state.source_actor, mapped_paths),
        };
        self.sink.publish(CoreEvent::notify(NotifyLevel::Success, message));

        Ok(ImportReport {
            dir,
            root_node,
            blobs_written,
            mapped_paths,
            truncated,
            ignored_swaps: meta.file_swaps.len(),
        })
    }
}

fn directory_name(description: &str) -> String {
    let name = sanitize_file_name(description);
    if name.is_empty() {
        format!("MCDF_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f"))
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_raw(raw: &[u8]) -> Vec<u8> {
        zstd::encode_all(raw, 0).unwrap()
    }

    #[test]
    fn bad_magic_and_version_are_rejected() {
        assert!(matches!(
            McdfContainer::decode(&encode_raw(b"NOPE\x01")),
            Err(InterchangeError::BadMagic)
        ));
        assert!(matches!(
            McdfContainer::decode(&encode_raw(b"MCDF\x02\0\0\0\0")),
            Err(InterchangeError::UnsupportedContainerVersion(2))
        ));
        assert!(matches!(
            McdfContainer::decode(&encode_raw(b"MCDF\x01\xff\0\0\0{}")),
            Err(InterchangeError::TruncatedHeader)
        ));
    }

    #[test]
    fn encoded_container_decodes() {
        let container = McdfContainer::from_files(
            McdfMetadata {
                description: "Hero".into(),
                ..Default::default()
            },
            vec![(vec!["chara/a.tex".into()], b"abc".to_vec())],
        );
        let decoded = McdfContainer::decode(&container.encode().unwrap()).unwrap();
        assert_eq!(decoded, container);
        let (entries, truncated) = decoded.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, b"abc");
        assert!(truncated.is_none());
    }

    #[test]
    fn metadata_uses_pascal_case() {
        let meta: McdfMetadata = serde_json::from_str(
            r#"{"Description":"d","ManipulationData":"m","Files":[{"GamePaths":["a.tex"],"Length":3,"Hash":"x"}],
                "FileSwaps":[{"GamePaths":["b.tex"],"FileSwapPath":"c.tex"}]}"#,
        )
        .unwrap();
        assert_eq!(meta.description, "d");
        assert_eq!(meta.files[0].length, 3);
        assert_eq!(meta.file_swaps[0].file_swap_path, "c.tex");
        assert!(meta.glamourer_data.is_empty());
    }

    #[test]
    fn empty_description_gets_timestamped_name() {
        assert!(directory_name("  ").starts_with("MCDF_"));
        assert_eq!(directory_name("My/Char"), "My_Char");
    }
}

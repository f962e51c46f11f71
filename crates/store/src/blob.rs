use crate::StoreError;
use charsnap_common::fsutil::write_atomic;
use charsnap_common::{BlobHash, GamePath};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Blob directory name inside a snapshot directory.
pub const FILES_DIR: &str = "files";
/// Fixed extension of the legacy naming scheme.
pub const LEGACY_EXTENSION: &str = "dat";

const MAX_HINT_EXTENSION_LEN: usize = 8;

/// Hash blob content: SHA-256, lowercase hex.
pub fn hash_bytes(data: &[u8]) -> BlobHash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    BlobHash::from_digest(&hasher.finalize())
}

/// Result of a `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    pub hash: BlobHash,
    /// Where the blob lives (existing file on a dedup hit).
    pub path: PathBuf,
    /// Whether bytes were actually written.
    pub written: bool,
}

/// A blob file physically present in the files directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub hash: BlobHash,
    pub file_name: String,
    pub path: PathBuf,
}

impl BlobEntry {
    pub fn is_legacy(&self) -> bool {
        self.file_name
            .strip_prefix(self.hash.as_str())
            .is_some_and(|rest| rest == format!(".{LEGACY_EXTENSION}"))
    }
}

/// Content-addressed blob storage under a snapshot's `files/` directory.
///
/// Two naming schemes coexist. The preferred scheme keeps the extension of
/// the logical path the blob was stored for (`<hash>.mtrl`); the legacy scheme
/// is `<hash>.dat`. Reads accept either, so old snapshot directories stay
/// readable without a rewrite pass.
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    /// Blob store of the snapshot at `snapshot_dir`.
    pub fn new(snapshot_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: snapshot_dir.as_ref().join(FILES_DIR),
        }
    }

    /// The files directory itself.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store `bytes` and return their hash. Skips the write when a blob with
    /// the same hash already resolves.
    pub fn put(&self, bytes: &[u8], hint: Option<&GamePath>) -> Result<PutOutcome, StoreError> {
        let hash = hash_bytes(bytes);
        if let Some(existing) = self.find_any(&hash, hint) {
            tracing::trace!(hash = %hash, "blob already stored");
            return Ok(PutOutcome {
                hash,
                path: existing,
                written: false,
            });
        }
        std::fs::create_dir_all(&self.dir)?;
        let path = self.resolve(&hash, hint);
        write_atomic(&path, bytes)?;
        tracing::debug!(hash = %hash, path = %path.display(), len = bytes.len(), "stored blob");
        Ok(PutOutcome {
            hash,
            path,
            written: true,
        })
    }

    /// Target path for a blob under the preferred scheme.
    pub fn resolve(&self, hash: &BlobHash, hint: Option<&GamePath>) -> PathBuf {
        self.preferred_path(hash, hint)
    }

    pub fn preferred_path(&self, hash: &BlobHash, hint: Option<&GamePath>) -> PathBuf {
        match hint.and_then(hint_extension) {
            Some(ext) => self.dir.join(format!("{hash}.{ext}")),
            None => self.legacy_path(hash),
        }
    }

    pub fn legacy_path(&self, hash: &BlobHash) -> PathBuf {
        self.dir.join(format!("{hash}.{LEGACY_EXTENSION}"))
    }

    /// Locate an existing blob: preferred path, then legacy path, then any
    /// other file whose stem is the hash. A miss is `None`.
    pub fn find_any(&self, hash: &BlobHash, hint: Option<&GamePath>) -> Option<PathBuf> {
        let preferred = self.preferred_path(hash, hint);
        if preferred.is_file() {
            return Some(preferred);
        }
        let legacy = self.legacy_path(hash);
        if legacy.is_file() {
            return Some(legacy);
        }
        let entries = std::fs::read_dir(&self.dir).ok()?;
        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .and_then(BlobHash::from_file_name)
                    .is_some_and(|h| &h == hash)
            })
            .map(|e| e.path())
            .collect();
        candidates.sort();
        candidates.into_iter().next()
    }

    pub fn contains(&self, hash: &BlobHash) -> bool {
        self.find_any(hash, None).is_some()
    }

    /// Read a blob's bytes; `None` when no file resolves.
    pub fn read(&self, hash: &BlobHash, hint: Option<&GamePath>) -> Result<Option<Vec<u8>>, StoreError> {
        match self.find_any(hash, hint) {
            Some(path) => Ok(Some(std::fs::read(path)?)),
            None => Ok(None),
        }
    }

    /// Every blob file physically present, ordered by hash with preferred
    /// names before the legacy name.
    pub fn entries(&self) -> Result<Vec<BlobEntry>, StoreError> {
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(hash) = BlobHash::from_file_name(&file_name) else {
                continue;
            };
            out.push(BlobEntry {
                hash,
                path: entry.path(),
                file_name,
            });
        }
        out.sort_by(|a, b| {
            (&a.hash, a.is_legacy(), &a.file_name).cmp(&(&b.hash, b.is_legacy(), &b.file_name))
        });
        Ok(out)
    }
}

fn hint_extension(hint: &GamePath) -> Option<String> {
    let ext = hint.extension()?;
    let usable = ext.len() <= MAX_HINT_EXTENSION_LEN
        && ext.bytes().all(|b| b.is_ascii_alphanumeric())
        && !ext.eq_ignore_ascii_case(LEGACY_EXTENSION);
    usable.then(|| ext.to_ascii_lowercase())
}

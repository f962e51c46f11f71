use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors from constructing the validated string types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    #[error("invalid game path: {0:?}")]
    InvalidGamePath(String),
    #[error("invalid blob hash: {0:?}")]
    InvalidHash(String),
}

/// Case-insensitive logical resource path ("game path").
///
/// Normalized on construction so that equality, ordering and hashing are all
/// case- and separator-insensitive: `Chara\Equipment\A.MTRL` and
/// `chara/equipment/a.mtrl` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GamePath(String);

impl GamePath {
    pub fn new(raw: &str) -> Result<Self, TypeError> {
        let normalized = raw.trim().replace('\\', "/").to_ascii_lowercase();
        if normalized.is_empty() || normalized.contains('\0') {
            return Err(TypeError::InvalidGamePath(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Extension of the final segment, without the dot.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(idx) if idx + 1 < name.len() => Some(&name[idx + 1..]),
            _ => None,
        }
    }

    pub fn has_extension(&self, ext: &str) -> bool {
        self.extension()
            .is_some_and(|e| e.eq_ignore_ascii_case(ext.trim_start_matches('.')))
    }
}

impl fmt::Display for GamePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GamePath {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for GamePath {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<GamePath> for String {
    fn from(value: GamePath) -> Self {
        value.0
    }
}

/// Content hash naming a blob. Lowercase hex, usable as a file name stem.
///
/// New blobs are hashed with SHA-256; older snapshots may carry other digest
/// lengths, which are accepted as opaque identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobHash(String);

impl BlobHash {
    const MAX_LEN: usize = 128;

    pub fn new(raw: &str) -> Result<Self, TypeError> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.len() > Self::MAX_LEN
            || !trimmed.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(TypeError::InvalidHash(raw.to_string()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// Hex-encode a raw digest.
    pub fn from_digest(digest: &[u8]) -> Self {
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            hex.push_str(&format!("{byte:02x}"));
        }
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover a hash from a blob file name: the stem before the first dot.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.split('.').next()?;
        Self::new(stem).ok()
    }
}

impl fmt::Display for BlobHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BlobHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for BlobHash {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<BlobHash> for String {
    fn from(value: BlobHash) -> Self {
        value.0
    }
}

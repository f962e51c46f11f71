use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Runtime configuration for the snapshot engine.
///
/// Every field has a default, so a config file only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Directory holding one subdirectory per snapshot.
    pub snapshots_root: PathBuf,
    /// Where migration backup archives are written.
    pub backup_dir: PathBuf,
    /// Where exported mod packs are written.
    pub export_dir: PathBuf,
    /// Author tag stamped into exported packs.
    pub author: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            snapshots_root: PathBuf::from("snapshots"),
            backup_dir: PathBuf::from("snapshots").join(".backups"),
            export_dir: PathBuf::from("exports"),
            author: "charsnap".into(),
        }
    }
}

impl CoreConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&text)?;
        tracing::debug!(path = %path.display(), ?config, "loaded config");
        Ok(config)
    }
}

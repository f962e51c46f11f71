//! File-backed stand-in for the live host: a YAML manifest describing what
//! the mod manager and appearance plugins would report for one actor.
//!
//! ```yaml
//! actor: Hero
//! world_id: 74
//! manipulation: "<compressed base64>"
//! glamourer: "<glamourer state>"
//! customize: "<customize+ profile>"
//! files:
//!   chara/equipment/e0001/texture/v01_c0101e0001_top_n.tex: textures/top_n.tex
//! ```
//! Relative file paths resolve against the manifest's directory.

use charsnap_common::{
    ActorRef, AppearanceProvider, GamePath, LiveResources, ManipulationProvider, ProviderError,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CaptureManifest {
    pub actor: String,
    pub world_id: Option<u32>,
    pub manipulation: String,
    pub glamourer: Option<String>,
    pub customize: Option<String>,
    pub files: BTreeMap<GamePath, PathBuf>,
}

impl CaptureManifest {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut manifest: Self = serde_yaml::from_str(&text)?;
        let base = path.parent().unwrap_or(Path::new("."));
        for source in manifest.files.values_mut() {
            if source.is_relative() {
                *source = base.join(&*source);
            }
        }
        Ok(manifest)
    }

    pub fn actor(&self, name_override: Option<&str>) -> ActorRef {
        ActorRef {
            name: name_override.unwrap_or(&self.actor).to_string(),
            world_id: self.world_id,
        }
    }
}

impl ManipulationProvider for CaptureManifest {
    fn current_resources(&self, actor: &ActorRef) -> Result<LiveResources, ProviderError> {
        if actor.name.trim().is_empty() {
            return Err(ProviderError::ActorUnavailable("manifest names no actor".into()));
        }
        Ok(LiveResources {
            files: self.files.clone(),
            manipulation: self.manipulation.clone(),
        })
    }
}

impl AppearanceProvider for CaptureManifest {
    fn glamourer_state(&self, _actor: &ActorRef) -> Result<Option<String>, ProviderError> {
        Ok(self.glamourer.clone())
    }

    fn customize_state(&self, _actor: &ActorRef) -> Result<Option<String>, ProviderError> {
        Ok(self.customize.clone())
    }
}

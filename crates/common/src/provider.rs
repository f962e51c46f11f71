//! Capability interfaces for the external mod tooling.
//!
//! The host supplies implementations; the core never depends on any specific
//! plugin's internals.

use crate::GamePath;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Identifies a live character the host can query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorRef {
    pub name: String,
    pub world_id: Option<u32>,
}

impl ActorRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            world_id: None,
        }
    }
}

/// Mod-manager view of an actor at one instant.
#[derive(Debug, Clone, Default)]
pub struct LiveResources {
    /// Logical path → on-disk file currently backing it.
    pub files: BTreeMap<GamePath, PathBuf>,
    /// Raw meta-manipulation payload.
    pub manipulation: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("actor not available: {0}")]
    ActorUnavailable(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolved resource files and the manipulation payload for an actor.
pub trait ManipulationProvider {
    fn current_resources(&self, actor: &ActorRef) -> Result<LiveResources, ProviderError>;
}

/// Companion appearance systems (Glamourer, Customize+).
pub trait AppearanceProvider {
    /// Serialized Glamourer state, if the actor has one.
    fn glamourer_state(&self, actor: &ActorRef) -> Result<Option<String>, ProviderError>;
    /// Base64 Customize+ profile, if the actor has one.
    fn customize_state(&self, actor: &ActorRef) -> Result<Option<String>, ProviderError>;
}

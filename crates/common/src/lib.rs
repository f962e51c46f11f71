//! Shared vocabulary for the charsnap workspace.
//!
//! # Invariants
//! - A `GamePath` is always normalized: lowercase, forward slashes, non-empty.
//! - A `BlobHash` is always lowercase hex and safe to use as a file name stem.
//! - The core never talks to external plugins directly; it only sees the
//!   capability traits in [`provider`] and publishes through an [`EventSink`].

pub mod config;
pub mod event;
pub mod fsutil;
pub mod payload;
pub mod provider;
mod types;

pub use config::{ConfigError, CoreConfig};
pub use event::{CoreEvent, EventSink, NotifyLevel, NullSink};
pub use provider::{ActorRef, AppearanceProvider, LiveResources, ManipulationProvider, ProviderError};
pub use types::{BlobHash, GamePath, TypeError};

//! Moving snapshots in and out: MCDF character files in, PMP mod packs out.
//!
//! # Invariants
//! - An import never reads past a short container entry; everything before it
//!   is kept and the truncation is reported.
//! - One export runs at a time per [`ExportCodec`]; the guard is released on
//!   every exit path.
//! - A selected material always travels with the textures it references when
//!   the snapshot maps them.

mod error;
pub mod manip;
pub mod mcdf;
pub mod mtrl;
pub mod pmp;
pub mod template;

pub use error::{InterchangeError, TruncatedEntry};
pub use mcdf::{ImportReport, McdfContainer, McdfImporter, McdfMetadata};
pub use mtrl::{MaterialError, MaterialFile};
pub use pmp::{ExportCodec, ExportReport, ExportRequest};

//! Wiki-link insertion into note files.
//!
//! ```text
//! store → selections (+ display names) → per file: read → skip unsafe/stale/overlap → rewrite
//! ```
//!
//! Offsets come from the store and are checked against the file as it is
//! now, so notes edited since extraction are never corrupted.

pub mod safety;
pub mod engine;
pub mod selection;

pub use safety::{is_editable, UnsafeZone, UnsafeZones, ZoneKind};
pub use engine::{
    apply_links, link_markup, link_text, FileFailure, LinkReport, LinkSelection, LinkedText,
    SkipCounts, SkipReason,
};
pub use selection::{filter_selections, find_entities, select_all, DisplayNames, OccurrenceRef};

use thiserror::Error;

use crate::pipeline::storage::StorageError;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("No entity named '{0}' in the store")]
    UnknownEntity(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

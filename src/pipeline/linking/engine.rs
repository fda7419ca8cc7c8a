use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::safety::UnsafeZones;
use super::LinkError;
use crate::models::{Entity, EntityStore, Occurrence};
use crate::pipeline::storage::{save_store, write_atomic};

/// One occurrence chosen for linking, with the name the link should show.
#[derive(Debug, Clone)]
pub struct LinkSelection<'a> {
    pub entity: &'a Entity,
    pub occurrence: &'a Occurrence,
    pub display_name: String,
}

/// Why a selected occurrence was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Starts inside an earlier selection in the same file.
    Overlap,
    /// Starts inside a heading, code fence, link or comment.
    UnsafeZone,
    /// The file no longer holds the recorded surface text at that span.
    Stale,
    MissingFile,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounts {
    pub overlap: usize,
    pub unsafe_zone: usize,
    pub stale: usize,
    pub missing_file: usize,
}

impl SkipCounts {
    pub fn record(&mut self, reason: SkipReason, n: usize) {
        match reason {
            SkipReason::Overlap => self.overlap += n,
            SkipReason::UnsafeZone => self.unsafe_zone += n,
            SkipReason::Stale => self.stale += n,
            SkipReason::MissingFile => self.missing_file += n,
        }
    }

    pub fn total(&self) -> usize {
        self.overlap + self.unsafe_zone + self.stale + self.missing_file
    }

    fn merge(&mut self, other: SkipCounts) {
        self.overlap += other.overlap;
        self.unsafe_zone += other.unsafe_zone;
        self.stale += other.stale;
        self.missing_file += other.missing_file;
    }
}

/// A note that could not be read or rewritten. Other notes are unaffected.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub file: PathBuf,
    pub error: String,
}

/// Outcome of one linking pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkReport {
    pub files_updated: Vec<PathBuf>,
    pub links_inserted: usize,
    pub skipped: SkipCounts,
    pub failures: Vec<FileFailure>,
}

impl LinkReport {
    pub fn summary(&self) -> String {
        format!("{} occurrences skipped", self.skipped.total())
    }
}

/// Wiki-link markup for `surface`, aliased when the display name differs.
pub fn link_markup(display_name: &str, surface: &str) -> String {
    if display_name == surface {
        format!("[[{surface}]]")
    } else {
        format!("[[{display_name}|{surface}]]")
    }
}

/// Result of linking one text in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedText {
    pub text: String,
    pub inserted: usize,
    pub skipped: SkipCounts,
}

/// Insert links for `selections` into `text`.
///
/// Selections are applied in ascending start order (stable for equal
/// starts). The first selection by position wins; later ones starting
/// before its end are overlaps.
pub fn link_text(text: &str, selections: &[&LinkSelection<'_>]) -> LinkedText {
    let mut ordered: Vec<&LinkSelection<'_>> = selections.to_vec();
    ordered.sort_by_key(|s| s.occurrence.span.start);

    let zones = UnsafeZones::scan(text);
    let mut out = String::with_capacity(text.len() + ordered.len() * 4);
    let mut skipped = SkipCounts::default();
    let mut inserted = 0;
    let mut last_idx = 0usize;

    for sel in ordered {
        let span = sel.occurrence.span;
        let start = span.start as usize;

        let reason = if start < last_idx {
            Some(SkipReason::Overlap)
        } else if zones.contains(start) {
            Some(SkipReason::UnsafeZone)
        } else if span.slice(text) != Some(sel.occurrence.surface_text.as_str()) {
            Some(SkipReason::Stale)
        } else {
            None
        };

        if let Some(reason) = reason {
            tracing::debug!(
                file = %sel.occurrence.file.display(),
                start = span.start,
                end = span.end,
                ?reason,
                "Skipping occurrence"
            );
            skipped.record(reason, 1);
            continue;
        }

        out.push_str(&text[last_idx..start]);
        out.push_str(&link_markup(&sel.display_name, &sel.occurrence.surface_text));
        last_idx = span.end as usize;
        inserted += 1;
    }

    out.push_str(&text[last_idx..]);
    LinkedText {
        text: out,
        inserted,
        skipped,
    }
}

/// Insert links into the note files and re-persist `store` at `store_path`.
///
/// Each file is read fresh, edited in memory and rewritten atomically only if
/// at least one link went in. A symlinked note is rewritten at its target.
/// A missing file is counted as skipped; a file that cannot be read or
/// written is recorded in the report and the pass moves on. Only a failure
/// to persist the store is an error.
pub fn apply_links(
    store: &EntityStore,
    store_path: &Path,
    selections: &[LinkSelection<'_>],
) -> Result<LinkReport, LinkError> {
    let mut by_file: BTreeMap<&Path, Vec<&LinkSelection<'_>>> = BTreeMap::new();
    for sel in selections {
        by_file
            .entry(sel.occurrence.file.as_path())
            .or_default()
            .push(sel);
    }

    tracing::info!(
        selections = selections.len(),
        files = by_file.len(),
        "Applying links"
    );

    let mut report = LinkReport::default();

    for (file, file_selections) in by_file {
        let text = match std::fs::read_to_string(file) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(file = %file.display(), "Note no longer exists, skipping");
                report
                    .skipped
                    .record(SkipReason::MissingFile, file_selections.len());
                continue;
            }
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "Failed to read note");
                report.failures.push(FileFailure {
                    file: file.to_path_buf(),
                    error: e.to_string(),
                });
                continue;
            }
        };

        let linked = link_text(&text, &file_selections);
        report.skipped.merge(linked.skipped);

        if linked.inserted == 0 {
            continue;
        }

        // write through symlinks so the link itself survives the rename
        let target = std::fs::canonicalize(file).unwrap_or_else(|_| file.to_path_buf());
        match write_atomic(&target, linked.text.as_bytes()) {
            Ok(()) => {
                tracing::debug!(file = %file.display(), links = linked.inserted, "Note updated");
                report.links_inserted += linked.inserted;
                report.files_updated.push(file.to_path_buf());
            }
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "Failed to write note");
                report.failures.push(FileFailure {
                    file: file.to_path_buf(),
                    error: e.to_string(),
                });
            }
        }
    }

    save_store(store_path, store)?;

    tracing::info!(
        files_updated = report.files_updated.len(),
        links = report.links_inserted,
        skipped = report.skipped.total(),
        failures = report.failures.len(),
        "Linking finished"
    );

    Ok(report)
}

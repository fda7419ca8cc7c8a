use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use super::engine::LinkSelection;
use super::LinkError;
use crate::models::{Entity, EntityStore, Occurrence};

/// Custom display names, one per canonical word.
#[derive(Debug, Clone, Default)]
pub struct DisplayNames {
    custom: HashMap<String, String>,
}

impl DisplayNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, word: impl Into<String>, display_name: impl Into<String>) {
        self.custom.insert(word.into(), display_name.into());
    }

    /// The custom name for `entity`'s word, exactly as given, or the word
    /// itself when no name (or only whitespace) was given.
    pub fn resolve(&self, entity: &Entity) -> String {
        match self.custom.get(&entity.canonical_word) {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => entity.canonical_word.clone(),
        }
    }
}

/// Entities matching each of `words` (case-insensitive), in request order.
/// A word that matches nothing is an error.
pub fn find_entities<'a>(
    store: &'a EntityStore,
    words: &[String],
) -> Result<Vec<&'a Entity>, LinkError> {
    let mut found: Vec<&Entity> = Vec::new();
    for word in words {
        let matches = store.find_by_word(word);
        if matches.is_empty() {
            return Err(LinkError::UnknownEntity(word.clone()));
        }
        for entity in matches {
            if !found.iter().any(|e| std::ptr::eq(*e, entity)) {
                found.push(entity);
            }
        }
    }
    Ok(found)
}

/// Every occurrence of every entity, each with its resolved display name.
pub fn select_all<'a>(entities: &[&'a Entity], names: &DisplayNames) -> Vec<LinkSelection<'a>> {
    entities
        .iter()
        .flat_map(|&entity| {
            let display_name = names.resolve(entity);
            entity.occurrences.iter().map(move |occurrence| LinkSelection {
                entity,
                occurrence,
                display_name: display_name.clone(),
            })
        })
        .collect()
}

/// One occurrence named on the command line as `FILE:START`.
///
/// `file` matches the stored path exactly or as a trailing component
/// sequence, so `trip.md:8` matches `/vault/travel/trip.md` at byte 8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccurrenceRef {
    pub file: PathBuf,
    pub start: u32,
}

impl OccurrenceRef {
    pub fn matches(&self, occurrence: &Occurrence) -> bool {
        occurrence.span.start == self.start
            && (occurrence.file == self.file || occurrence.file.ends_with(&self.file))
    }
}

impl FromStr for OccurrenceRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (file, start) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("expected FILE:START, got '{s}'"))?;
        if file.is_empty() {
            return Err(format!("missing file in '{s}'"));
        }
        let start = start
            .parse()
            .map_err(|_| format!("invalid start offset '{start}' in '{s}'"))?;
        Ok(Self {
            file: PathBuf::from(file),
            start,
        })
    }
}

/// Narrow `selections` to a subset of occurrences.
///
/// With a non-empty `only`, a selection is kept only if some ref in `only`
/// matches it. Anything matched by `skip` is then dropped.
pub fn filter_selections<'a>(
    selections: Vec<LinkSelection<'a>>,
    only: &[OccurrenceRef],
    skip: &[OccurrenceRef],
) -> Vec<LinkSelection<'a>> {
    selections
        .into_iter()
        .filter(|sel| only.is_empty() || only.iter().any(|r| r.matches(sel.occurrence)))
        .filter(|sel| !skip.iter().any(|r| r.matches(sel.occurrence)))
        .collect()
}

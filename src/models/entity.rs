use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::span::Span;

/// One detection returned by the inference adapter for one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMention {
    pub label: String,
    /// Model confidence in `[0, 1]`.
    pub score: f32,
    pub span: Span,
}

impl RawMention {
    pub fn new(label: impl Into<String>, score: f32, start: u32, end: u32) -> Self {
        Self {
            label: label.into(),
            score,
            span: Span::new(start, end),
        }
    }
}

/// A mention materialized with its owning file and exact surface text.
///
/// `surface_text` is what `text[start..end]` held at extraction time; the
/// linker compares it against the current file to detect staleness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub file: PathBuf,
    #[serde(flatten)]
    pub span: Span,
    #[serde(rename = "word")]
    pub surface_text: String,
}

/// Aggregate of every mention sharing a label and normalized surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "entity_group", alias = "label")]
    pub label: String,
    /// First-seen trimmed surface, used for display.
    #[serde(rename = "word")]
    pub canonical_word: String,
    pub normalized_word: String,
    /// Sum of contributing mention scores. A ranking weight, not a probability.
    pub score: f64,
    /// Discovery order, not position order.
    pub occurrences: Vec<Occurrence>,
}

impl Entity {
    /// `trim(surface).lowercase()`, the text half of an entity key.
    pub fn normalize(surface: &str) -> String {
        surface.trim().to_lowercase()
    }

    pub fn key(&self) -> (&str, &str) {
        (&self.label, &self.normalized_word)
    }

    /// One-line listing, e.g. `Paris (Group: LOC, Score: 1.85)`.
    pub fn summary(&self) -> String {
        format!(
            "{} (Group: {}, Score: {:.2})",
            self.canonical_word, self.label, self.score
        )
    }
}

/// The persisted result of one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityStore {
    /// Sorted by descending score.
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub processed_files: Vec<PathBuf>,
}

impl EntityStore {
    pub fn occurrence_count(&self) -> usize {
        self.entities.iter().map(|e| e.occurrences.len()).sum()
    }

    /// Entities whose normalized word matches `word` case-insensitively.
    /// More than one entity can match when the model assigned several labels.
    pub fn find_by_word(&self, word: &str) -> Vec<&Entity> {
        let wanted = Entity::normalize(word);
        self.entities
            .iter()
            .filter(|e| e.normalized_word == wanted)
            .collect()
    }
}

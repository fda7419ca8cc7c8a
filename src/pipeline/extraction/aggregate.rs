use std::collections::HashMap;
use std::path::Path;

use crate::models::{Entity, Occurrence, RawMention};

/// Folds mentions into entities keyed by `(label, normalized surface)`.
///
/// Entities keep discovery order until [`finish`](Self::finish) sorts them.
#[derive(Debug, Default)]
pub struct EntityAggregator {
    index: HashMap<(String, String), usize>,
    entities: Vec<Entity>,
    discarded: usize,
}

impl EntityAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one mention found in `text` (the link-stripped text of `file`).
    ///
    /// Returns `false` when the mention is discarded: empty or invalid span,
    /// or a surface that is blank once trimmed.
    pub fn add(&mut self, file: &Path, text: &str, mention: &RawMention) -> bool {
        let Some(surface) = mention.span.slice(text) else {
            tracing::debug!(
                file = %file.display(),
                start = mention.span.start,
                end = mention.span.end,
                "Discarding mention with invalid span"
            );
            self.discarded += 1;
            return false;
        };

        let normalized = Entity::normalize(surface);
        if normalized.is_empty() {
            self.discarded += 1;
            return false;
        }

        let key = (mention.label.clone(), normalized);
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                let idx = self.entities.len();
                self.entities.push(Entity {
                    label: key.0.clone(),
                    canonical_word: surface.trim().to_string(),
                    normalized_word: key.1.clone(),
                    score: 0.0,
                    occurrences: Vec::new(),
                });
                self.index.insert(key, idx);
                idx
            }
        };

        let entity = &mut self.entities[idx];
        entity.score += f64::from(mention.score);
        entity.occurrences.push(Occurrence {
            file: file.to_path_buf(),
            span: mention.span,
            surface_text: surface.to_string(),
        });
        true
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Entities by descending score; ties keep discovery order.
    pub fn finish(self) -> Vec<Entity> {
        let mut entities = self.entities;
        entities.sort_by(|a, b| b.score.total_cmp(&a.score));
        entities
    }
}

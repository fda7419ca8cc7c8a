use thiserror::Error;

use crate::models::RawMention;

/// Failure reported by an inference adapter.
///
/// Running out of capacity (accelerator memory, server overload) is kept
/// apart from every other failure: the batcher recovers from the former by
/// shrinking the batch and treats the latter as fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("out of capacity: {0}")]
    Capacity(String),

    #[error("{0}")]
    Failed(String),
}

impl InferenceError {
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::Capacity(_))
    }
}

/// Named-entity recognizer used by the extraction pipeline.
///
/// `infer` returns one mention list per input text, in input order, with
/// byte offsets into that text. Implementations hold a stateful session, so
/// calls take `&mut self` and are never made concurrently.
pub trait NerModel {
    /// Short identifier for logs (model name or endpoint).
    fn name(&self) -> &str;

    fn infer(
        &mut self,
        texts: &[&str],
        batch_size: usize,
    ) -> Result<Vec<Vec<RawMention>>, InferenceError>;
}

impl<M: NerModel + ?Sized> NerModel for Box<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn infer(
        &mut self,
        texts: &[&str],
        batch_size: usize,
    ) -> Result<Vec<Vec<RawMention>>, InferenceError> {
        (**self).infer(texts, batch_size)
    }
}

/// Mock NER model for testing. Tags every exact occurrence of a fixed
/// list of terms.
///
/// Optionally fails with a capacity error above a batch-size limit, or with a
/// fatal error on every call. Records the batch size of each call.
pub struct MockNerModel {
    terms: Vec<(String, String, f32)>,
    capacity_limit: Option<usize>,
    failure: Option<String>,
    calls: Vec<MockCall>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockCall {
    pub batch_size: usize,
    pub text_count: usize,
}

impl MockNerModel {
    pub fn new() -> Self {
        Self {
            terms: Vec::new(),
            capacity_limit: None,
            failure: None,
            calls: Vec::new(),
        }
    }

    pub fn with_term(mut self, surface: &str, label: &str, score: f32) -> Self {
        self.terms.push((surface.to_string(), label.to_string(), score));
        self
    }

    /// Batch sizes above `max_batch` fail with [`InferenceError::Capacity`].
    pub fn with_capacity_limit(mut self, max_batch: usize) -> Self {
        self.capacity_limit = Some(max_batch);
        self
    }

    /// Every call fails with [`InferenceError::Failed`].
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> &[MockCall] {
        &self.calls
    }

    fn tag(&self, text: &str) -> Vec<RawMention> {
        let mut mentions = Vec::new();
        for (surface, label, score) in &self.terms {
            if surface.is_empty() {
                continue;
            }
            for (start, matched) in text.match_indices(surface.as_str()) {
                let end = start + matched.len();
                if let (Ok(start), Ok(end)) = (u32::try_from(start), u32::try_from(end)) {
                    mentions.push(RawMention::new(label.as_str(), *score, start, end));
                }
            }
        }
        mentions.sort_by_key(|m| m.span.start);
        mentions
    }
}

impl Default for MockNerModel {
    fn default() -> Self {
        Self::new()
    }
}

impl NerModel for MockNerModel {
    fn name(&self) -> &str {
        "mock"
    }

    fn infer(
        &mut self,
        texts: &[&str],
        batch_size: usize,
    ) -> Result<Vec<Vec<RawMention>>, InferenceError> {
        self.calls.push(MockCall {
            batch_size,
            text_count: texts.len(),
        });

        if let Some(message) = &self.failure {
            return Err(InferenceError::Failed(message.clone()));
        }
        if let Some(limit) = self.capacity_limit {
            if batch_size > limit {
                return Err(InferenceError::Capacity(format!(
                    "CUDA out of memory at batch size {batch_size}"
                )));
            }
        }

        Ok(texts.iter().map(|text| self.tag(text)).collect())
    }
}

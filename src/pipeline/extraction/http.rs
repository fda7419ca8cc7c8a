use serde::{Deserialize, Serialize};

use super::ner::{InferenceError, NerModel};
use crate::config::{DEFAULT_NER_URL, NER_URL_ENV};
use crate::models::RawMention;

/// Blocking HTTP client for a token-classification server.
///
/// `POST {base_url}/ner` with `{"inputs": [...], "batch_size": n}`; the server
/// answers with one list of `{entity_group, score, start, end}` per input,
/// offsets counted in characters. Offsets are converted to bytes here.
pub struct HttpNerClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl HttpNerClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, InferenceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| InferenceError::Failed(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    /// Server from `ENTITY_LINKER_NER_URL`, or localhost:8080, with a
    /// 10-minute timeout (large batches on CPU are slow).
    pub fn from_env() -> Result<Self, InferenceError> {
        let url = std::env::var(NER_URL_ENV).unwrap_or_else(|_| DEFAULT_NER_URL.to_string());
        Self::new(&url, 600)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Serialize)]
struct NerRequest<'a> {
    inputs: &'a [&'a str],
    batch_size: usize,
}

#[derive(Deserialize)]
struct WireMention {
    #[serde(alias = "entity", alias = "label")]
    entity_group: String,
    score: f32,
    start: usize,
    end: usize,
}

impl NerModel for HttpNerClient {
    fn name(&self) -> &str {
        &self.base_url
    }

    fn infer(
        &mut self,
        texts: &[&str],
        batch_size: usize,
    ) -> Result<Vec<Vec<RawMention>>, InferenceError> {
        let url = format!("{}/ner", self.base_url);
        let body = NerRequest {
            inputs: texts,
            batch_size,
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_connect() {
                InferenceError::Failed(format!("NER server is not running at {}", self.base_url))
            } else if e.is_timeout() {
                InferenceError::Failed(format!("Request timed out after {}s", self.timeout_secs))
            } else {
                InferenceError::Failed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(classify_failure(status.as_u16(), &body));
        }

        let parsed: Vec<Vec<WireMention>> = response
            .json()
            .map_err(|e| InferenceError::Failed(format!("Malformed NER response: {e}")))?;

        if parsed.len() != texts.len() {
            return Err(InferenceError::Failed(format!(
                "NER server returned {} results for {} inputs",
                parsed.len(),
                texts.len()
            )));
        }

        Ok(texts
            .iter()
            .zip(parsed)
            .map(|(text, mentions)| to_byte_mentions(text, mentions))
            .collect())
    }
}

/// Map a failed response onto the capacity / fatal split.
fn classify_failure(status: u16, body: &str) -> InferenceError {
    let lower = body.to_lowercase();
    if status == 507 || lower.contains("out of memory") || body.contains("CUDA") {
        InferenceError::Capacity(format!("status {status}: {body}"))
    } else {
        InferenceError::Failed(format!("NER server returned error (status {status}): {body}"))
    }
}

/// `map[i]` is the byte offset of char `i`; the extra last entry is `text.len()`.
fn char_to_byte_map(text: &str) -> Vec<usize> {
    let mut map: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
    map.push(text.len());
    map
}

fn to_byte_mentions(text: &str, mentions: Vec<WireMention>) -> Vec<RawMention> {
    let map = char_to_byte_map(text);
    mentions
        .into_iter()
        .filter_map(|m| {
            let start = map.get(m.start).and_then(|&b| u32::try_from(b).ok());
            let end = map.get(m.end).and_then(|&b| u32::try_from(b).ok());
            match (start, end) {
                (Some(start), Some(end)) => {
                    Some(RawMention::new(m.entity_group, m.score, start, end))
                }
                _ => {
                    tracing::debug!(
                        start = m.start,
                        end = m.end,
                        chars = map.len() - 1,
                        "Dropping mention with out-of-range offsets"
                    );
                    None
                }
            }
        })
        .collect()
}

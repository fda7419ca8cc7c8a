//! Entity extraction over a folder of notes.
//!
//! ```text
//! corpus → strip links → batcher (probe once) → NER per batch → aggregate → store
//! ```
//!
//! The NER model sits behind [`NerModel`]; everything else is plain file and
//! string handling so offsets recorded here map 1:1 onto the note files.

pub mod types;
pub mod ner;
pub mod http;
pub mod batcher;
pub mod strip;
pub mod corpus;
pub mod aggregate;
pub mod orchestrator;
pub mod background;

pub use types::*;
pub use ner::{InferenceError, MockNerModel, NerModel};
pub use http::HttpNerClient;
pub use batcher::probe_batch_size;
pub use strip::neutralize_links;
pub use aggregate::EntityAggregator;
pub use orchestrator::{extract, run_extraction};
pub use background::{spawn_extraction, ExtractionHandle};

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::inference_service::InferenceServiceError;
use crate::pipeline::storage::StorageError;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to read {path}: {source}")]
    CorpusRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Inference ran out of capacity at batch size {batch_size}: {message}")]
    InferenceCapacity { batch_size: usize, message: String },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Inference session unavailable: {0}")]
    SessionUnavailable(#[from] InferenceServiceError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Extraction cancelled")]
    Cancelled,

    #[error("Extraction worker panicked")]
    WorkerPanicked,
}

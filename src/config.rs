use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Application-level constants
pub const APP_NAME: &str = "Entity Linker";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Store file name used when the caller does not pick one.
pub const DEFAULT_STORE_FILE: &str = "entities.json";

/// Note extensions scanned by default (compared case-insensitively).
pub const DEFAULT_NOTE_EXTENSIONS: &[&str] = &["md"];

/// First candidate tried by the adaptive batcher.
pub const DEFAULT_INITIAL_BATCH_SIZE: usize = 32;

/// Number of leading texts used as the probe sample.
pub const DEFAULT_PROBE_SAMPLE_SIZE: usize = 64;

/// Environment variable holding the NER server base URL.
pub const NER_URL_ENV: &str = "ENTITY_LINKER_NER_URL";

/// NER server used when `ENTITY_LINKER_NER_URL` is unset.
pub const DEFAULT_NER_URL: &str = "http://localhost:8080";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "entity_linker_lib=info,entity_linker=info,warn"
}

/// Errors detected before any work starts. Nothing is read or written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Notes folder is not set")]
    MissingNotesRoot,

    #[error("Notes folder does not exist or is not a directory: {0}")]
    NotesRootNotDirectory(PathBuf),

    #[error("Output store path is not set")]
    MissingOutput,

    #[error("Initial batch size must be at least 1")]
    ZeroBatchSize,

    #[error("At least one note extension is required")]
    NoExtensions,
}

/// Configuration for one extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Folder scanned recursively for notes.
    pub notes_root: PathBuf,
    /// Where the entity store is written.
    pub output: PathBuf,
    /// Accepted file extensions, without the leading dot.
    pub extensions: Vec<String>,
    /// Largest batch size the batcher tries first.
    pub initial_batch_size: usize,
    /// How many leading notes the batcher probes with.
    pub probe_sample_size: usize,
}

impl ExtractionConfig {
    pub fn new(notes_root: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            notes_root: notes_root.into(),
            output: output.into(),
            ..Self::default()
        }
    }

    /// Check paths and sizes. Returns the config with an absolute notes root
    /// and output path so stored occurrences stay valid from any directory.
    pub fn validate(&self) -> Result<Self, ConfigError> {
        if self.notes_root.as_os_str().is_empty() {
            return Err(ConfigError::MissingNotesRoot);
        }
        if self.output.as_os_str().is_empty() {
            return Err(ConfigError::MissingOutput);
        }
        if self.initial_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }
        if !self.notes_root.is_dir() {
            return Err(ConfigError::NotesRootNotDirectory(self.notes_root.clone()));
        }

        let notes_root = std::fs::canonicalize(&self.notes_root)
            .map_err(|_| ConfigError::NotesRootNotDirectory(self.notes_root.clone()))?;

        Ok(Self {
            notes_root,
            output: absolutize(&self.output),
            ..self.clone()
        })
    }

    /// Whether `path` carries one of the configured note extensions.
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            notes_root: PathBuf::new(),
            output: PathBuf::from(DEFAULT_STORE_FILE),
            extensions: DEFAULT_NOTE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            initial_batch_size: DEFAULT_INITIAL_BATCH_SIZE,
            probe_sample_size: DEFAULT_PROBE_SAMPLE_SIZE,
        }
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

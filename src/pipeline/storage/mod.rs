pub mod atomic;
pub mod entity_store;

pub use atomic::write_atomic;
pub use entity_store::{load_store, save_store};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Entity store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Entity store not found: {0}")]
    StoreNotFound(PathBuf),

    #[error("Failed to write {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

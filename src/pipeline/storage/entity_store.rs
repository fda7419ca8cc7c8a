use std::path::Path;

use super::atomic::write_atomic;
use super::StorageError;
use crate::models::EntityStore;

/// Persist the store as pretty-printed JSON, creating the parent directory
/// if needed. The previous store survives any failure.
pub fn save_store(path: &Path, store: &EntityStore) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| StorageError::Persist {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let mut json = serde_json::to_vec_pretty(store)?;
    json.push(b'\n');
    write_atomic(path, &json)?;

    tracing::debug!(
        path = %path.display(),
        entities = store.entities.len(),
        occurrences = store.occurrence_count(),
        "Entity store saved"
    );
    Ok(())
}

/// Load a store written by [`save_store`].
pub fn load_store(path: &Path) -> Result<EntityStore, StorageError> {
    if !path.is_file() {
        return Err(StorageError::StoreNotFound(path.to_path_buf()));
    }
    let bytes = std::fs::read(path)?;
    let store: EntityStore = serde_json::from_slice(&bytes)?;

    tracing::debug!(
        path = %path.display(),
        entities = store.entities.len(),
        "Entity store loaded"
    );
    Ok(store)
}

use std::io::Write;
use std::path::Path;

use super::StorageError;

/// Replace `path` with `contents` in one rename.
///
/// The bytes go to a temp file in the destination directory first, so a
/// failure at any point leaves the previous file untouched. Permissions of an
/// existing file are carried over to its replacement.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let persist_err = |source: std::io::Error| StorageError::Persist {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(persist_err)?;
    tmp.write_all(contents).map_err(persist_err)?;
    tmp.as_file().sync_all().map_err(persist_err)?;

    if let Ok(existing) = std::fs::metadata(path) {
        tmp.as_file()
            .set_permissions(existing.permissions())
            .map_err(persist_err)?;
    }

    tmp.persist(path).map_err(|e| persist_err(e.error))?;
    Ok(())
}

use std::path::{Path, PathBuf};

use super::types::Note;
use super::ExtractionError;
use crate::config::ExtractionConfig;

/// All note files under `config.notes_root`, sorted by path.
///
/// Hidden entries (leading `.`) are skipped. Symlinked files are followed,
/// symlinked directories are not.
pub fn collect_note_files(config: &ExtractionConfig) -> Result<Vec<PathBuf>, ExtractionError> {
    let mut files = Vec::new();
    walk(&config.notes_root, config, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk(dir: &Path, config: &ExtractionConfig, out: &mut Vec<PathBuf>) -> Result<(), ExtractionError> {
    let read_err = |source| ExtractionError::CorpusRead {
        path: dir.to_path_buf(),
        source,
    };

    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }

        let path = entry.path();
        let file_type = entry.file_type().map_err(read_err)?;
        if file_type.is_dir() {
            walk(&path, config, out)?;
        } else if (file_type.is_file() || (file_type.is_symlink() && path.is_file()))
            && config.accepts(&path)
        {
            out.push(path);
        }
    }
    Ok(())
}

/// Read every file fully. The first failure aborts the load.
pub fn load_notes(files: &[PathBuf]) -> Result<Vec<Note>, ExtractionError> {
    files
        .iter()
        .map(|path| {
            std::fs::read_to_string(path)
                .map(|text| Note {
                    path: path.clone(),
                    text,
                })
                .map_err(|source| ExtractionError::CorpusRead {
                    path: path.clone(),
                    source,
                })
        })
        .collect()
}

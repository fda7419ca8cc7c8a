use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One note loaded into memory.
#[derive(Debug, Clone)]
pub struct Note {
    pub path: PathBuf,
    pub text: String,
}

/// Notification emitted while an extraction run progresses.
///
/// A run emits `Started`, then `Progress` events with non-decreasing
/// percentages, then exactly one of `Completed` (after `Progress` 100) or
/// `Failed`. Nothing follows the terminal event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEvent {
    Started {
        run_id: Uuid,
        file_count: u32,
    },
    Progress {
        percent: u8,
        files_processed: u32,
        total_files: u32,
    },
    Completed {
        entities_found: u32,
        files_processed: u32,
        batch_size: u32,
        duration_ms: u64,
    },
    Failed {
        error: String,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// `round(100 * processed / total)`; an empty corpus counts as done.
pub fn percent_complete(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (100.0 * processed as f64 / total as f64).round();
    pct.clamp(0.0, 100.0) as u8
}

//! Snapshot JSON files, as exchanged with peers or captured for inspection.

use std::path::Path;

use pairsync_core::types::StateSnapshot;

use crate::error::{io_err, SyncError};

/// Read a snapshot from `path`. The aggregate hash is recomputed on load.
pub fn load_snapshot(path: &Path) -> Result<StateSnapshot, SyncError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_json::from_str(&contents).map_err(|source| SyncError::Snapshot {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `snapshot` to `path` atomically via a `.tmp` sibling.
pub fn save_snapshot(path: &Path, snapshot: &StateSnapshot) -> Result<(), SyncError> {
    let json = serde_json::to_string_pretty(snapshot).map_err(|source| SyncError::Snapshot {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

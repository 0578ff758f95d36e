//! Error types for pairsync-sync.

use std::path::PathBuf;

use thiserror::Error;

use pairsync_core::error::StoreError;

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the content store.
    #[error("content store error: {0}")]
    Store(#[from] StoreError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot file parse or encode error.
    #[error("failed to parse snapshot at {path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The orchestrator has reverted its target and accepts no more snapshots.
    #[error("orchestrator has been torn down")]
    TornDown,
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

//! Error types for pairsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from configuration load/save.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, with annotated path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`; cannot locate `~/.pairsync/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// A value parsed but is unusable.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors raised by a content resolver implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no record for content hash {0}")]
    UnknownHash(String),
}

/// Errors raised by mutation backends and the asset fetcher.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend is not reachable (plugin unloaded, IPC gone, ...).
    #[error("{backend} backend unavailable: {reason}")]
    Unavailable {
        backend: &'static str,
        reason: String,
    },

    /// The backend refused or failed the call.
    #[error("{backend} backend failed: {reason}")]
    Failed {
        backend: &'static str,
        reason: String,
    },
}

/// A governing generation moved on; the holder must stop without mutating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("superseded by a newer request")]
pub struct Cancelled;

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn config_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`StoreError::Io`].
pub fn store_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}

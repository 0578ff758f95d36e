use thiserror::Error;

/// Error surface of the session runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Config(#[from] pairsync_core::error::ConfigError),

    #[error("sync error: {0}")]
    Sync(#[from] pairsync_sync::SyncError),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("{task} task failed: {reason}")]
    Task { task: &'static str, reason: String },
}

use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the artifact source and the polling runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] artisync_core::ConfigError),

    #[error("sync error: {0}")]
    Sync(#[from] artisync_sync::SyncError),

    /// Listing or downloading from the artifact provider failed.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}

//! Error types for artisync-sync.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An archive entry resolves outside the destination root.
    #[error("illegal file path: {path} escapes destination root")]
    PathTraversal { path: String },

    /// A later archive entry resolves to the same file as an earlier one.
    #[error("duplicate destination: {path} resolves to the same file as {first}")]
    DuplicateDestination { path: String, first: String },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The package could not be read as a zip archive.
    #[error("archive error in {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// The extraction worker pool could not be started.
    #[error("worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// JSON serialization/deserialization error (ledger).
    #[error("ledger JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`SyncError::Archive`].
pub(crate) fn archive_err(path: impl Into<PathBuf>, source: zip::result::ZipError) -> SyncError {
    SyncError::Archive {
        path: path.into(),
        source,
    }
}

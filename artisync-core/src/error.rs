//! Error types for artisync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading configuration.
///
/// Every variant is fatal at startup: the process refuses to run partially
/// configured.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure while reading a config document.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON parse error, with the offending file.
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// YAML parse error, with the offending file.
    #[error("failed to parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// None of the accepted file names exist for a required document.
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },

    /// The document parsed but its content is unusable.
    #[error("invalid configuration in {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    /// `dirs::home_dir()` returned `None`, cannot locate `~/.artisync/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}

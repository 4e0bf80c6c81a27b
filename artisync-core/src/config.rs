//! Job and secret configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.artisync/
//!   job.json      (array of jobs; job.yaml / job.yml accepted instead)
//!   secret.json   (array of {owner, token}; secret.yaml / secret.yml accepted)
//! ```
//!
//! # API pattern
//!
//! - `fn_at(root: &Path, …)`: explicit root, used in tests with `TempDir`
//! - `fn(…)`: derives root from `dirs::home_dir()`, delegates to `_at`
//!
//! Configuration is loaded once at startup and validated as a whole; any
//! problem is a [`ConfigError`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::{io_err, ConfigError};
use crate::types::{Config, Job, Secret, Secrets};

/// File stem of the jobs document.
pub const JOB_FILE_STEM: &str = "job";
/// File stem of the secrets document.
pub const SECRET_FILE_STEM: &str = "secret";

const EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.artisync/`. Pure, no I/O.
pub fn root_at(home: &Path) -> PathBuf {
    home.join(".artisync")
}

/// `<home>/.artisync/` (convenience wrapper over `dirs::home_dir()`).
pub fn default_root() -> Result<PathBuf, ConfigError> {
    Ok(root_at(&home()?))
}

/// First existing `<root>/<stem>.{json,yaml,yml}`.
pub fn document_path_at(root: &Path, stem: &str) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|ext| root.join(format!("{stem}.{ext}")))
        .find(|path| path.is_file())
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load and validate the full configuration from `root`.
pub fn load_at(root: &Path) -> Result<Config, ConfigError> {
    let (jobs_path, jobs) = load_document::<Vec<Job>>(root, JOB_FILE_STEM)?;
    let (secrets_path, secrets) = load_document::<Vec<Secret>>(root, SECRET_FILE_STEM)?;
    let secrets: Secrets = secrets.into_iter().collect();

    validate_jobs(&jobs_path, &jobs)?;
    validate_tokens(&secrets_path, &jobs, &secrets)?;

    Ok(Config { jobs, secrets })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&default_root()?)
}

fn load_document<T: DeserializeOwned>(
    root: &Path,
    stem: &str,
) -> Result<(PathBuf, T), ConfigError> {
    let Some(path) = document_path_at(root, stem) else {
        return Err(ConfigError::NotFound {
            path: root.join(format!("{stem}.json")),
        });
    };
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext != "json")
        .unwrap_or(false);

    let value = if is_yaml {
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Yaml {
            path: path.clone(),
            source,
        })?
    } else {
        serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.clone(),
            source,
        })?
    };
    Ok((path, value))
}

// ---------------------------------------------------------------------------
// 3. Validation
// ---------------------------------------------------------------------------

fn validate_jobs(path: &Path, jobs: &[Job]) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        path: path.to_path_buf(),
        reason,
    };

    let mut seen = HashSet::new();
    for (index, job) in jobs.iter().enumerate() {
        for (field, value) in [
            ("owner", &job.owner),
            ("repo", &job.repo),
            ("artifactName", &job.artifact_name),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(format!("job #{index}: `{field}` must not be empty")));
            }
        }
        if job.deploy_path.as_os_str().is_empty() {
            return Err(invalid(format!(
                "job {}: `deployPath` must not be empty",
                job.key()
            )));
        }
        if !seen.insert(job.key()) {
            return Err(invalid(format!("duplicate job {}", job.key())));
        }
    }
    Ok(())
}

fn validate_tokens(path: &Path, jobs: &[Job], secrets: &Secrets) -> Result<(), ConfigError> {
    for job in jobs {
        match secrets.token_for(&job.owner) {
            Some(token) if !token.expose().is_empty() => {}
            _ => {
                return Err(ConfigError::Invalid {
                    path: path.to_path_buf(),
                    reason: format!("no token for owner '{}' (job {})", job.owner, job.key()),
                })
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

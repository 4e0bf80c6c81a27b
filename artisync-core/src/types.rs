//! Domain types for artisync.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Job and secret documents use the camelCase field names of the on-disk JSON.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Composite identity of a job: `<owner>.<repo>.<artifactName>`.
///
/// Used as the ledger key and as the file stem of the cached package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(pub String);

impl JobKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for JobKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A provider access token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

// ---------------------------------------------------------------------------
// Configuration documents
// ---------------------------------------------------------------------------

/// One synchronization target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub owner: String,
    pub repo: String,
    pub artifact_name: String,
    /// Full-path regular expressions; matching entries are never deployed.
    #[serde(default)]
    pub excludes: Vec<String>,
    pub deploy_path: PathBuf,
}

impl Job {
    pub fn key(&self) -> JobKey {
        JobKey(format!("{}.{}.{}", self.owner, self.repo, self.artifact_name))
    }
}

/// One entry of the secrets document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub owner: String,
    pub token: Token,
}

/// Tokens keyed by repository owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Secrets(HashMap<String, Token>);

impl Secrets {
    pub fn token_for(&self, owner: &str) -> Option<&Token> {
        self.0.get(owner)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Secret> for Secrets {
    /// Later entries for the same owner replace earlier ones.
    fn from_iter<I: IntoIterator<Item = Secret>>(iter: I) -> Self {
        Self(iter.into_iter().map(|s| (s.owner, s.token)).collect())
    }
}

/// Validated, immutable process configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub jobs: Vec<Job>,
    pub secrets: Secrets,
}

// ---------------------------------------------------------------------------
// Provider data
// ---------------------------------------------------------------------------

/// A single version of a named build output as reported by the provider.
///
/// Two versions are the same version iff their `created_at` are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactVersion {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub size_in_bytes: u64,
    pub archive_download_url: String,
    #[serde(default)]
    pub expired: bool,
    pub created_at: DateTime<Utc>,
}

impl ArtifactVersion {
    pub fn is_same_version(&self, applied: Option<DateTime<Utc>>) -> bool {
        applied == Some(self.created_at)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

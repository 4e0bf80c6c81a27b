//! Update ledger: which artifact version each job last retrieved.
//!
//! Persisted as a JSON object mapping `owner.repo.artifactName` to the RFC 3339
//! creation time of the artifact, e.g.
//!
//! ```json
//! { "acme.site.dist": "2024-05-01T12:00:00Z" }
//! ```
//!
//! Every [`Ledger::set`] writes through to disk with the same atomic replace
//! used for deployed files. The in-memory map is only updated once the write
//! has succeeded, so memory and disk never disagree.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use artisync_core::JobKey;
use chrono::{DateTime, Utc};

use crate::atomic;
use crate::error::{io_err, SyncError};

/// Durable `JobKey` → version map.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    entries: BTreeMap<String, DateTime<Utc>>,
}

impl Ledger {
    /// Load the ledger stored at `path`.
    ///
    /// A missing or blank file yields an empty ledger; nothing is created
    /// until the first [`set`](Self::set).
    pub fn load_at(path: &Path) -> Result<Self, SyncError> {
        let entries = match std::fs::read_to_string(path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| SyncError::Json {
                path: path.to_path_buf(),
                source,
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(io_err(path, err)),
        };
        tracing::debug!("ledger {} loaded: {} entries", path.display(), entries.len());
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Creation time of the last version retrieved for `key`.
    pub fn get(&self, key: &JobKey) -> Option<DateTime<Utc>> {
        self.entries.get(key.as_str()).copied()
    }

    /// Record `version` for `key` and persist the whole ledger.
    ///
    /// On error the ledger is left exactly as it was.
    pub fn set(&mut self, key: &JobKey, version: DateTime<Utc>) -> Result<(), SyncError> {
        let mut next = self.entries.clone();
        next.insert(key.to_string(), version);
        self.persist(&next)?;
        self.entries = next;
        Ok(())
    }

    /// Write the current state to disk.
    pub fn flush(&self) -> Result<(), SyncError> {
        self.persist(&self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(key, version)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, DateTime<Utc>)> {
        self.entries.iter().map(|(key, at)| (key.as_str(), *at))
    }

    fn persist(&self, entries: &BTreeMap<String, DateTime<Utc>>) -> Result<(), SyncError> {
        let json = serde_json::to_vec_pretty(entries).map_err(|source| SyncError::Json {
            path: self.path.clone(),
            source,
        })?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        atomic::replace_bytes(&self.path, &json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn empty_ledger_when_file_missing() {
        let tmp = TempDir::new().unwrap();
        let ledger = Ledger::load_at(&tmp.path().join("ledger.json")).unwrap();
        assert!(ledger.is_empty());
        assert!(!tmp.path().join("ledger.json").exists());
    }

    #[test]
    fn set_survives_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ledger.json");
        let key = JobKey::from("acme.site.dist");

        let mut ledger = Ledger::load_at(&path).unwrap();
        ledger.set(&key, at(1_700_000_000)).unwrap();

        let reloaded = Ledger::load_at(&path).unwrap();
        assert_eq!(reloaded.get(&key), Some(at(1_700_000_000)));
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn creates_parent_directory_on_first_write() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state").join("ledger.json");
        let mut ledger = Ledger::load_at(&path).unwrap();
        ledger.set(&JobKey::from("a.b.c"), at(1)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn reads_legacy_log_document() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ledger.json");
        std::fs::write(
            &path,
            r#"{"acme.site.dist":"2024-05-01T12:00:00Z","acme.api.bundle":"2024-05-02T08:30:00+02:00"}"#,
        )
        .unwrap();

        let ledger = Ledger::load_at(&path).unwrap();
        assert_eq!(
            ledger.get(&JobKey::from("acme.api.bundle")),
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 6, 30, 0).unwrap())
        );
        let keys: Vec<&str> = ledger.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["acme.api.bundle", "acme.site.dist"]);
    }

    #[test]
    fn malformed_file_is_a_json_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ledger.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = Ledger::load_at(&path).unwrap_err();
        assert!(matches!(err, SyncError::Json { .. }), "got: {err}");
    }

    #[test]
    fn failed_persist_leaves_memory_unchanged() {
        let tmp = TempDir::new().unwrap();
        let state = tmp.path().join("state");
        let mut ledger = Ledger::load_at(&state.join("ledger.json")).unwrap();
        // A regular file where the state directory should be.
        std::fs::write(&state, "file").unwrap();

        let key = JobKey::from("a.b.c");
        ledger.set(&key, at(5)).unwrap_err();
        assert_eq!(ledger.get(&key), None);
        assert!(ledger.is_empty());
    }

    #[test]
    fn flush_writes_current_state() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ledger.json");
        let mut ledger = Ledger::load_at(&path).unwrap();
        ledger.set(&JobKey::from("a.b.c"), at(10)).unwrap();
        std::fs::remove_file(&path).unwrap();

        ledger.flush().unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"a.b.c\""));
    }
}

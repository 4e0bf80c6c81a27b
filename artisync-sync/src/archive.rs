//! Archive synchronization: apply every entry of a zip package to a
//! destination directory.
//!
//! Entries that normalize to the same destination (`a.txt`, `./a.txt`,
//! `x/../a.txt`) are settled before any work starts: the first in archive
//! order owns the file and every later one fails with
//! [`SyncError::DuplicateDestination`]. The remaining entries are independent,
//! so they are extracted on a bounded worker pool. Each worker opens its own
//! handle on the package; nothing is shared between workers except the
//! read-only inputs. [`Synchronizer::synchronize`] returns only after every
//! entry has an outcome.
//!
//! Before enumerating, temp files left in the destination by an interrupted
//! replace are removed (see [`atomic::remove_leftovers`]).

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::atomic;
use crate::error::{archive_err, io_err, SyncError};
use crate::exclude::ExclusionSet;
use crate::extract::{resolve_destination, sync_entry, EntryOutcome, EntrySource};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Result of synchronizing one package.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// One outcome per file entry that was not excluded, in archive order.
    pub outcomes: Vec<EntryOutcome>,
    /// Entry paths skipped by the job's exclusion rules.
    pub excluded: Vec<String>,
    /// Number of directory entries (never synchronized).
    pub directories: usize,
}

impl SyncReport {
    pub fn written(&self) -> usize {
        self.count(|o| matches!(o, EntryOutcome::Written { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, EntryOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, EntryOutcome::Failed { .. }))
    }

    /// `(entry path, error)` for every failed entry.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &SyncError)> {
        self.outcomes.iter().filter_map(|o| match o {
            EntryOutcome::Failed { path, error } => Some((path.as_str(), error)),
            _ => None,
        })
    }

    fn count(&self, pred: impl Fn(&EntryOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

/// Worker count used when none is configured.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}

/// Applies packages with a fixed-size extraction pool.
pub struct Synchronizer {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl Synchronizer {
    /// Build a synchronizer with `workers` extraction threads (at least one).
    pub fn new(workers: usize) -> Result<Self, SyncError> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("artisync-extract-{index}"))
            .build()?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Synchronize every file entry of `package` into `root`.
    ///
    /// Directory entries and entries matched by `exclusions` are skipped.
    /// Per-entry failures are logged and returned in the report; only a
    /// package that cannot be opened at all is an error.
    pub fn synchronize(
        &self,
        package: &Path,
        root: &Path,
        exclusions: &ExclusionSet,
    ) -> Result<SyncReport, SyncError> {
        let mut archive = open_archive(package)?;
        if root.is_dir() {
            let removed = atomic::remove_leftovers(root);
            if removed > 0 {
                tracing::info!(
                    "removed {removed} stale temp file(s) under {}",
                    root.display()
                );
            }
        }

        let mut report = SyncReport::default();
        let mut candidates = Vec::new();
        let mut owners: HashMap<PathBuf, String> = HashMap::new();

        for index in 0..archive.len() {
            let entry = archive
                .by_index_raw(index)
                .map_err(|e| archive_err(package, e))?;
            if entry.is_dir() {
                report.directories += 1;
                continue;
            }
            let name = entry.name().to_string();
            if exclusions.is_excluded(&name) {
                tracing::debug!("excluded: {name}");
                report.excluded.push(name);
                continue;
            }
            // Unresolvable names are left to sync_entry, which reports them.
            let duplicate_of = match resolve_destination(root, &name) {
                Ok(dest) => match owners.get(&dest) {
                    Some(first) => Some(first.clone()),
                    None => {
                        owners.insert(dest, name.clone());
                        None
                    }
                },
                Err(_) => None,
            };
            candidates.push(Candidate {
                index,
                name,
                duplicate_of,
            });
        }
        drop(archive);

        report.outcomes = self.pool.install(|| {
            candidates
                .par_iter()
                .map_init(
                    || open_archive(package),
                    |archive, candidate| match (archive, &candidate.duplicate_of) {
                        (_, Some(first)) => EntryOutcome::Failed {
                            path: candidate.name.clone(),
                            error: SyncError::DuplicateDestination {
                                path: candidate.name.clone(),
                                first: first.clone(),
                            },
                        },
                        (Ok(archive), None) => {
                            let mut entry = ZipEntry {
                                archive,
                                index: candidate.index,
                            };
                            sync_entry(&mut entry, &candidate.name, root)
                        }
                        (Err(err), None) => EntryOutcome::Failed {
                            path: candidate.name.clone(),
                            error: io_err(package, io::Error::other(err.to_string())),
                        },
                    },
                )
                .collect()
        });

        for (path, error) in report.failures() {
            tracing::error!("extract {path}: {error}");
        }
        tracing::info!(
            "synced {} into {}: {} written, {} unchanged, {} excluded, {} failed",
            package.display(),
            root.display(),
            report.written(),
            report.skipped(),
            report.excluded.len(),
            report.failed(),
        );
        Ok(report)
    }
}

/// A file entry queued for extraction.
struct Candidate {
    index: usize,
    name: String,
    /// Earlier entry that already owns the same destination.
    duplicate_of: Option<String>,
}

fn open_archive(package: &Path) -> Result<ZipArchive<File>, SyncError> {
    let file = File::open(package).map_err(|e| io_err(package, e))?;
    ZipArchive::new(file).map_err(|e| archive_err(package, e))
}

/// One entry of an open archive, re-openable by index.
struct ZipEntry<'z> {
    archive: &'z mut ZipArchive<File>,
    index: usize,
}

impl EntrySource for ZipEntry<'_> {
    type Reader<'a> = zip::read::ZipFile<'a>
    where
        Self: 'a;

    fn open(&mut self) -> io::Result<Self::Reader<'_>> {
        self.archive.by_index(self.index).map_err(zip_to_io)
    }
}

fn zip_to_io(err: ZipError) -> io::Error {
    match err {
        ZipError::Io(err) => err,
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}

//! Differential extraction of a single archive entry.
//!
//! ## `sync_entry` protocol
//!
//! 1. Resolve `<root>/<entry path>` lexically; reject anything that leaves
//!    the root before touching the filesystem.
//! 2. Fingerprint the entry content.
//! 3. Fingerprint the file on disk (a missing file always differs).
//! 4. Equal → skip, nothing is written.
//! 5. Create parent directories.
//! 6. Re-open the entry and stream it through [`atomic::replace_with`].
//!
//! Entry content is read twice instead of buffered, so memory stays flat for
//! large files.

use std::io::{self, ErrorKind, Read};
use std::path::{Component, Path, PathBuf};

use crate::atomic;
use crate::error::{io_err, SyncError};
use crate::fingerprint::{fingerprint_file, fingerprint_reader};

// ---------------------------------------------------------------------------
// Entry content
// ---------------------------------------------------------------------------

/// Re-openable content of one archive entry.
pub trait EntrySource {
    type Reader<'a>: Read
    where
        Self: 'a;

    /// Open a fresh reader positioned at the start of the entry.
    fn open(&mut self) -> io::Result<Self::Reader<'_>>;
}

/// In-memory entry content.
#[derive(Debug, Clone)]
pub struct MemoryEntry(pub Vec<u8>);

impl EntrySource for MemoryEntry {
    type Reader<'a> = &'a [u8];

    fn open(&mut self) -> io::Result<Self::Reader<'_>> {
        Ok(self.0.as_slice())
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Outcome of synchronizing one entry.
#[derive(Debug)]
pub enum EntryOutcome {
    /// Destination already had identical content; nothing was touched.
    Skipped { path: String },
    /// Destination was created or replaced.
    Written { path: String, bytes: u64 },
    /// The entry could not be applied. Sibling entries are unaffected.
    Failed { path: String, error: SyncError },
}

impl EntryOutcome {
    /// Entry path relative to the destination root.
    pub fn path(&self) -> &str {
        match self {
            EntryOutcome::Skipped { path }
            | EntryOutcome::Written { path, .. }
            | EntryOutcome::Failed { path, .. } => path,
        }
    }
}

// ---------------------------------------------------------------------------
// Destination resolution
// ---------------------------------------------------------------------------

/// Resolve `entry_path` under `root`, normalizing `.` and `..` lexically.
///
/// Fails with [`SyncError::PathTraversal`] for absolute paths, drive
/// prefixes, paths that climb above `root`, and paths that normalize to
/// nothing.
pub fn resolve_destination(root: &Path, entry_path: &str) -> Result<PathBuf, SyncError> {
    let traversal = || SyncError::PathTraversal {
        path: entry_path.to_string(),
    };

    let mut normalized = PathBuf::new();
    for component in Path::new(entry_path).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(traversal());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(traversal()),
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(traversal());
    }
    Ok(root.join(normalized))
}

// ---------------------------------------------------------------------------
// sync_entry
// ---------------------------------------------------------------------------

/// Bring `<root>/<entry_path>` in line with `source`.
///
/// Never panics and never returns early with an error: every failure is
/// reported as [`EntryOutcome::Failed`].
pub fn sync_entry<S: EntrySource>(source: &mut S, entry_path: &str, root: &Path) -> EntryOutcome {
    let path = entry_path.to_string();
    match extract_if_changed(source, entry_path, root) {
        Ok(Some(bytes)) => EntryOutcome::Written { path, bytes },
        Ok(None) => EntryOutcome::Skipped { path },
        Err(error) => EntryOutcome::Failed { path, error },
    }
}

/// `Ok(None)` when unchanged, `Ok(Some(bytes))` when written.
fn extract_if_changed<S: EntrySource>(
    source: &mut S,
    entry_path: &str,
    root: &Path,
) -> Result<Option<u64>, SyncError> {
    let dest = resolve_destination(root, entry_path)?;

    let incoming = source
        .open()
        .and_then(fingerprint_reader)
        .map_err(|e| io_err(entry_path, e))?;

    match fingerprint_file(&dest) {
        Ok(existing) if existing == incoming => {
            tracing::debug!("unchanged: {entry_path}");
            return Ok(None);
        }
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(io_err(&dest, err)),
    }

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }

    let mut reader = source.open().map_err(|e| io_err(entry_path, e))?;
    let bytes = atomic::replace_with(&dest, &mut reader)?;

    tracing::info!("extracted: {entry_path} ({bytes} bytes, {incoming})");
    Ok(Some(bytes))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Durable atomic file replacement.
//!
//! ## Protocol
//!
//! 1. Create a temp file next to the destination (same directory, so the
//!    rename never crosses a volume).
//! 2. Copy the new content into it.
//! 3. Copy permissions from the file being replaced (`0644` for new files).
//! 4. `fsync` the temp file.
//! 5. Rename over the destination (atomic on POSIX).
//! 6. Best-effort `fsync` of the directory.
//!
//! Any failure before step 5 drops the temp file, which deletes it. The
//! destination holds either its old content or the new content, never a mix.
//!
//! A process killed between steps 1 and 5 never gets to drop the temp file.
//! Those `.artisync-*.tmp` leftovers are cleared by [`remove_leftovers`],
//! which the synchronizer runs over the destination before each package.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::error::{io_err, SyncError};

const TMP_PREFIX: &str = ".artisync-";
const TMP_SUFFIX: &str = ".tmp";

/// Atomically replace `path` with everything `content` yields.
///
/// The parent directory must exist. Returns the number of bytes written.
pub fn replace_with<R: Read>(path: &Path, content: &mut R) -> Result<u64, SyncError> {
    replace_with_hook(path, content, |_| Ok(()))
}

/// Atomically replace `path` with `bytes`.
pub fn replace_bytes(path: &Path, bytes: &[u8]) -> Result<u64, SyncError> {
    replace_with(path, &mut &bytes[..])
}

/// [`replace_with`] with a hook that runs after the temp file is durable and
/// before the rename. An error from the hook aborts the replace.
pub(crate) fn replace_with_hook<R, F>(
    path: &Path,
    content: &mut R,
    before_rename: F,
) -> Result<u64, SyncError>
where
    R: Read,
    F: FnOnce(&Path) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(TMP_PREFIX)
        .suffix(TMP_SUFFIX)
        .tempfile_in(dir)
        .map_err(|e| io_err(dir, e))?;

    let written = io::copy(content, tmp.as_file_mut()).map_err(|e| io_err(tmp.path(), e))?;
    copy_permissions(path, &tmp)?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| io_err(tmp.path(), e))?;

    before_rename(tmp.path()).map_err(|e| io_err(tmp.path(), e))?;

    // On failure the temp file travels back inside the error and is removed
    // when it is dropped.
    tmp.persist(path).map_err(|e| io_err(path, e.error))?;
    sync_dir(dir);
    Ok(written)
}

/// Delete temp files left under `dir` by interrupted replaces.
///
/// Symlinks are not followed. Unreadable entries and failed removals are
/// logged and skipped. Returns the number of files removed.
pub fn remove_leftovers(dir: &Path) -> usize {
    let mut removed = 0;
    for entry in WalkDir::new(dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!("scan {}: {err}", dir.display());
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_leftover(entry.file_name().to_str()) {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => {
                tracing::debug!("removed stale temp file {}", entry.path().display());
                removed += 1;
            }
            Err(err) => tracing::warn!("remove {}: {err}", entry.path().display()),
        }
    }
    removed
}

fn is_leftover(name: Option<&str>) -> bool {
    name.is_some_and(|n| n.starts_with(TMP_PREFIX) && n.ends_with(TMP_SUFFIX))
}

#[cfg(unix)]
fn copy_permissions(target: &Path, tmp: &NamedTempFile) -> Result<(), SyncError> {
    use std::os::unix::fs::PermissionsExt;

    let permissions = match std::fs::metadata(target) {
        Ok(meta) => meta.permissions(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            std::fs::Permissions::from_mode(0o644)
        }
        Err(err) => return Err(io_err(target, err)),
    };
    tmp.as_file()
        .set_permissions(permissions)
        .map_err(|e| io_err(tmp.path(), e))
}

#[cfg(not(unix))]
fn copy_permissions(_target: &Path, _tmp: &NamedTempFile) -> Result<(), SyncError> {
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

use std::path::{Path, PathBuf};
use std::time::Duration;

use artisync_core::JobKey;

pub const LEDGER_FILE: &str = "ledger.json";
pub const ARTIFACTS_DIR: &str = "artifacts";
pub const PACKAGE_EXTENSION: &str = "zip";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub fn ledger_path(root: &Path) -> PathBuf {
    root.join(LEDGER_FILE)
}

pub fn artifacts_dir(root: &Path) -> PathBuf {
    root.join(ARTIFACTS_DIR)
}

/// `<root>/artifacts/<owner.repo.artifactName>.zip`
pub fn package_path(root: &Path, key: &JobKey) -> PathBuf {
    artifacts_dir(root).join(format!("{key}.{PACKAGE_EXTENSION}"))
}

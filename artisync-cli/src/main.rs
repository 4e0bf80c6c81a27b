//! artisync: keep deploy directories in sync with CI build artifacts.
//!
//! # Usage
//!
//! ```text
//! artisync [--root <dir>] [--interval <secs>] [--workers <n>] [--api-url <url>] [--once]
//! ```
//!
//! Reads `job.json` and `secret.json` from the root (default `~/.artisync`),
//! then polls every configured job until interrupted with Ctrl-C.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use artisync_core::config;
use artisync_daemon::source::GITHUB_API;
use artisync_daemon::{start_blocking, Options};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "artisync",
    version,
    about = "Deploy the latest CI build artifacts, rewriting only files that changed",
    long_about = None,
)]
struct Cli {
    /// Directory holding job.json, secret.json, the ledger and cached packages.
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Seconds between polling cycles.
    #[arg(long, value_name = "SECS", default_value_t = 300,
          value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,

    /// Extraction worker threads per package (defaults to available cores).
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    workers: Option<u64>,

    /// Artifact provider API root.
    #[arg(long, value_name = "URL", default_value = GITHUB_API)]
    api_url: String,

    /// Run a single polling cycle and exit.
    #[arg(long)]
    once: bool,
}

impl Cli {
    fn options(&self) -> Options {
        let defaults = Options::default();
        Options {
            interval: Duration::from_secs(self.interval),
            workers: self
                .workers
                .map_or(defaults.workers, |n| usize::try_from(n).unwrap_or(usize::MAX)),
            api_base: self.api_url.clone(),
            once: self.once,
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => config::default_root().context("could not determine artisync root")?,
    };

    start_blocking(&root, cli.options())
        .with_context(|| format!("artisync exited with error (root: {})", root.display()))
}

//! Polling runtime: watch artifact providers and apply new versions.

mod error;
pub mod paths;
mod runtime;
pub mod source;

pub use error::DaemonError;
pub use runtime::{
    poll_loop, run, run_cycle, run_job, run_with, start_blocking, Context, JobOutcome, Options,
    PreparedJob,
};
pub use source::{select_latest, ArtifactList, ArtifactSource, GithubSource};

//! artisync core library: domain types, configuration loading and errors.
//!
//! - [`types`]: newtypes and domain structs
//! - [`error`]: [`ConfigError`]
//! - [`config`]: load / validate job and secret documents

pub mod config;
pub mod error;
pub mod types;

pub use error::ConfigError;
pub use types::{ArtifactVersion, Config, Job, JobKey, Secret, Secrets, Token};

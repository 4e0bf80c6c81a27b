//! # artisync-sync
//!
//! Differential, atomic application of artifact packages to a deploy
//! directory, plus the durable update ledger.
//!
//! Call [`Synchronizer::synchronize`] to bring a destination in line with a
//! zip package. Only entries whose content differs from what is on disk are
//! rewritten, and every write is an atomic replace.

pub mod archive;
pub mod atomic;
pub mod error;
pub mod exclude;
pub mod extract;
pub mod fingerprint;
pub mod ledger;

pub use archive::{default_workers, SyncReport, Synchronizer};
pub use error::SyncError;
pub use exclude::{is_excluded, ExclusionSet};
pub use extract::{sync_entry, EntryOutcome, EntrySource, MemoryEntry};
pub use fingerprint::{fingerprint, fingerprint_file, Fingerprint};
pub use ledger::Ledger;

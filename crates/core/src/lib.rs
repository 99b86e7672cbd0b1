//! Core types and traits for raftlog
//!
//! This crate defines the foundational pieces shared by every storage backend:
//! - Error: Error type hierarchy for storage operations
//! - LogEntry / SnapshotMeta: data carried by log and snapshot storages
//! - Traits: LogStorage, StableStorage, SnapshotStorage, SnapshotWriter, SnapshotReader
//! - ErrorState: accumulated (code, text) diagnostics for snapshot I/O

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod error_state;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use error_state::{ErrorReporting, ErrorState, EINVAL, EIO, ENOENT, ENOSPC};
pub use traits::{LogStorage, SnapshotReader, SnapshotStorage, SnapshotWriter, StableStorage};
pub use types::{LogEntry, SnapshotFile, SnapshotMeta};

//! Storage traits produced by backend factories
//!
//! A backend registered in the storage registry hands out three kinds of
//! storage: the replicated log, the stable (term/vote) record, and snapshot
//! storage. Snapshot writers and readers share the [`ErrorReporting`]
//! contract so callers can inspect `error_code()` / `error_text()` after a
//! failed operation.

use std::path::Path;

use tracing::warn;

use crate::error::Result;
use crate::error_state::ErrorReporting;
use crate::types::{LogEntry, SnapshotMeta};

/// Replicated log storage
///
/// Thread safety: all methods take `&self` and must be safe to call from
/// multiple threads.
pub trait LogStorage: Send + Sync {
    /// Index of the first entry still held (1 for a fresh log)
    fn first_log_index(&self) -> u64;

    /// Index of the last entry held, `first_log_index() - 1` when empty
    fn last_log_index(&self) -> u64;

    /// Get the entry at `index`, or `None` outside the held range
    fn get_entry(&self, index: u64) -> Result<Option<LogEntry>>;

    /// Term of the entry at `index`, 0 when absent
    fn get_term(&self, index: u64) -> u64;

    /// Append one entry; its index must be `last_log_index() + 1`
    fn append_entry(&self, entry: &LogEntry) -> Result<()>;

    /// Append entries in order, returning how many were appended
    ///
    /// # Errors
    ///
    /// Returns the error of the first entry if it cannot be appended. A
    /// later failure is logged and the count appended so far is returned;
    /// those entries stay appended.
    fn append_entries(&self, entries: &[LogEntry]) -> Result<usize> {
        for (appended, entry) in entries.iter().enumerate() {
            if let Err(e) = self.append_entry(entry) {
                if appended == 0 {
                    return Err(e);
                }
                warn!(
                    index = entry.index,
                    appended,
                    error = %e,
                    "append_entries stopped early"
                );
                return Ok(appended);
            }
        }
        Ok(entries.len())
    }

    /// Drop every entry before `first_index_kept`
    fn truncate_prefix(&self, first_index_kept: u64) -> Result<()>;

    /// Drop every entry after `last_index_kept`
    fn truncate_suffix(&self, last_index_kept: u64) -> Result<()>;

    /// Drop all entries and restart the log at `next_log_index`
    fn reset(&self, next_log_index: u64) -> Result<()>;
}

/// Durable record of the current term and vote
pub trait StableStorage: Send {
    /// Current term, 0 if never set
    fn term(&self) -> u64;

    /// Peer voted for in the current term, empty if none
    fn votedfor(&self) -> &str;

    /// Persist term and vote together
    fn set_term_and_votedfor(&mut self, term: u64, votedfor: &str) -> Result<()>;
}

/// Snapshot storage: hands out writers and readers
pub trait SnapshotStorage: Send {
    /// Start a new snapshot
    fn create(&mut self) -> Result<Box<dyn SnapshotWriter>>;

    /// Finish a writer
    ///
    /// Commits the snapshot if the writer recorded no error, otherwise
    /// discards it and returns the writer's accumulated error.
    fn close_writer(&mut self, writer: Box<dyn SnapshotWriter>) -> Result<()>;

    /// Open the newest committed snapshot, `None` if there is none
    fn open(&mut self) -> Result<Option<Box<dyn SnapshotReader>>>;
}

/// Writes one snapshot
pub trait SnapshotWriter: ErrorReporting + Send {
    /// Directory the snapshot is written into
    fn path(&self) -> &Path;

    /// Add a file to the snapshot
    fn add_file(&mut self, name: &str, data: &[u8]) -> Result<()>;

    /// Persist snapshot metadata (file list is filled in by the writer)
    fn save_meta(&mut self, meta: &SnapshotMeta) -> Result<()>;

    /// Names of files added so far
    fn list_files(&self) -> Vec<String>;

    /// Saved metadata, if `save_meta` succeeded
    fn meta(&self) -> Option<&SnapshotMeta>;
}

/// Reads one committed snapshot
pub trait SnapshotReader: ErrorReporting + Send {
    /// Directory of the snapshot being read
    fn path(&self) -> &Path;

    /// Load and validate snapshot metadata
    fn load_meta(&mut self) -> Result<SnapshotMeta>;

    /// Read a file recorded in the snapshot, verifying its checksum
    fn read_file(&mut self, name: &str) -> Result<Vec<u8>>;

    /// Names of files recorded in the snapshot meta
    fn list_files(&mut self) -> Result<Vec<String>>;
}

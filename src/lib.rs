//! raftlog - Pluggable storage backends for a replicated log
//!
//! Storage backends register under a URI scheme; callers that only hold a
//! URI string resolve the backend and build log, stable, and snapshot
//! storages from it.
//!
//! # Quick Start
//!
//! ```no_run
//! use raftlog::{init_storage, LogEntry};
//!
//! // Registry with the local-filesystem backend under `file`
//! let registry = init_storage()?;
//!
//! // `file://` URIs and bare paths both resolve to the local backend
//! let descriptor = registry.find_storage("/var/lib/raft/log").unwrap();
//! let log = (descriptor.log_storage_factory)("/var/lib/raft/log")?;
//! log.append_entry(&LogEntry::new(1, 1, b"hello".to_vec()))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! - `raftlog-core`: error types, storage traits, `ErrorState`
//! - `raftlog-storage`: `StorageRegistry`, the `raft_sync` flag, and the
//!   local-filesystem backend

pub use raftlog_core::*;
pub use raftlog_storage::*;

//! Storage backends for raftlog
//!
//! This crate resolves "which backend handles this URI" and ships the
//! built-in local-filesystem backend:
//! - StorageRegistry: scheme -> StorageDescriptor, capacity 16, append-only
//! - init_storage: registry seeded with the `file` backend
//! - uri: scheme extraction and local path derivation
//! - config: the reloadable `raft_sync` flag and local storage options
//! - local: LocalLogStorage, LocalStableStorage, LocalSnapshotStorage
//!
//! # Usage
//!
//! ```no_run
//! use raftlog_storage::init_storage;
//!
//! let registry = init_storage().expect("built-in storage must register");
//! let descriptor = registry.find_storage("file:///data/raft/log").unwrap();
//! let log = (descriptor.log_storage_factory)("file:///data/raft/log").unwrap();
//! assert_eq!(log.first_log_index(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod local;
pub mod registry;
pub mod uri;

pub use config::{
    parse_flag, raft_sync, set_raft_sync, set_raft_sync_from_str, ConfigError, LocalStorageOptions,
};
pub use local::{
    create_local_log_storage, create_local_snapshot_storage, create_local_stable_storage,
    LocalLogStorage, LocalSnapshotReader, LocalSnapshotStorage, LocalSnapshotWriter,
    LocalStableStorage,
};
pub use registry::{
    init_storage, local_storage_descriptor, LogStorageFactory, RegistryError,
    SnapshotStorageFactory, StableStorageFactory, StorageDescriptor, StorageRegistry,
    MAX_STORAGE_SIZE,
};

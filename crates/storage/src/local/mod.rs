//! Local-filesystem storage backend
//!
//! Registered under scheme `file`. A URI such as `file:///data/raft/log`
//! (or the bare path `/data/raft/log`) names a directory:
//!
//! | Storage | Files |
//! |---------|-------|
//! | log | `log_data` (records), `log_meta` (first index) |
//! | stable | `stable_meta` |
//! | snapshot | `temp/` while writing, `snapshot_NNNNNNNNNNNNNNNNNNNN/` once committed |
//!
//! Small metadata files use the write-fsync-rename pattern:
//!
//! 1. Write to a `.tmp` sibling
//! 2. fsync the temporary file
//! 3. Atomic rename to final path
//! 4. fsync the parent directory
//!
//! fsync calls are skipped when `LocalStorageOptions::sync` is false.

pub mod log;
pub mod snapshot;
pub mod stable;

pub use log::LocalLogStorage;
pub use snapshot::{LocalSnapshotReader, LocalSnapshotStorage, LocalSnapshotWriter};
pub use stable::LocalStableStorage;

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use raftlog_core::{LogStorage, Result, SnapshotStorage, StableStorage};

use crate::config::LocalStorageOptions;
use crate::uri::local_path;

/// Factory for [`LocalLogStorage`], registered in the `file` descriptor
pub fn create_local_log_storage(uri: &str) -> Result<Box<dyn LogStorage>> {
    let storage = LocalLogStorage::open(local_path(uri)?, LocalStorageOptions::from_flags())?;
    Ok(Box::new(storage))
}

/// Factory for [`LocalStableStorage`], registered in the `file` descriptor
pub fn create_local_stable_storage(uri: &str) -> Result<Box<dyn StableStorage>> {
    let storage = LocalStableStorage::open(local_path(uri)?, LocalStorageOptions::from_flags())?;
    Ok(Box::new(storage))
}

/// Factory for [`LocalSnapshotStorage`], registered in the `file` descriptor
pub fn create_local_snapshot_storage(uri: &str) -> Result<Box<dyn SnapshotStorage>> {
    let storage = LocalSnapshotStorage::open(local_path(uri)?, LocalStorageOptions::from_flags())?;
    Ok(Box::new(storage))
}

/// Replace `path` with `data` using write-fsync-rename
pub(crate) fn write_atomic(path: &Path, data: &[u8], sync: bool) -> io::Result<()> {
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    if sync {
        file.sync_all()?;
    }
    drop(file);

    fs::rename(&temp_path, path)?;

    if sync {
        if let Some(parent) = path.parent() {
            sync_dir(parent)?;
        }
    }
    Ok(())
}

/// fsync a directory so renames and removals inside it are durable
pub(crate) fn sync_dir(dir: &Path) -> io::Result<()> {
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    File::open(dir)?.sync_all()
}

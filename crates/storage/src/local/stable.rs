//! Local stable storage
//!
//! Term and vote are kept together in one `stable_meta` JSON file, replaced
//! atomically on every update so a crash never leaves a term without its
//! vote.

use std::path::{Path, PathBuf};

use raftlog_core::{Result, StableStorage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::write_atomic;
use crate::config::LocalStorageOptions;

/// Meta file name
pub const STABLE_META_FILE: &str = "stable_meta";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StableMeta {
    term: u64,
    votedfor: String,
}

/// Stable storage backed by a local directory
#[derive(Debug)]
pub struct LocalStableStorage {
    path: PathBuf,
    options: LocalStorageOptions,
    meta: StableMeta,
}

impl LocalStableStorage {
    /// Open (or create) stable storage in `dir`
    pub fn open(dir: impl Into<PathBuf>, options: LocalStorageOptions) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(STABLE_META_FILE);
        let meta = if path.exists() {
            serde_json::from_slice(&std::fs::read(&path)?)?
        } else {
            StableMeta::default()
        };

        debug!(path = %path.display(), term = meta.term, "Opened local stable storage");
        Ok(LocalStableStorage {
            path,
            options,
            meta,
        })
    }

    /// Path of the meta file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StableStorage for LocalStableStorage {
    fn term(&self) -> u64 {
        self.meta.term
    }

    fn votedfor(&self) -> &str {
        &self.meta.votedfor
    }

    fn set_term_and_votedfor(&mut self, term: u64, votedfor: &str) -> Result<()> {
        let meta = StableMeta {
            term,
            votedfor: votedfor.to_string(),
        };
        let bytes = serde_json::to_vec(&meta)?;
        write_atomic(&self.path, &bytes, self.options.sync)?;
        self.meta = meta;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_storage() {
        let temp_dir = tempfile::tempdir().unwrap();
        let stable =
            LocalStableStorage::open(temp_dir.path(), LocalStorageOptions::for_testing()).unwrap();

        assert_eq!(stable.term(), 0);
        assert_eq!(stable.votedfor(), "");
        assert!(!stable.path().exists());
    }

    #[test]
    fn test_set_and_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        {
            let mut stable =
                LocalStableStorage::open(temp_dir.path(), LocalStorageOptions::default()).unwrap();
            stable.set_term_and_votedfor(3, "10.0.0.1:8100").unwrap();
            stable.set_term_and_votedfor(4, "10.0.0.2:8100").unwrap();
        }

        let stable =
            LocalStableStorage::open(temp_dir.path(), LocalStorageOptions::for_testing()).unwrap();
        assert_eq!(stable.term(), 4);
        assert_eq!(stable.votedfor(), "10.0.0.2:8100");
    }

    #[test]
    fn test_corrupted_meta_fails_open() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join(STABLE_META_FILE), b"{not json").unwrap();

        let result = LocalStableStorage::open(temp_dir.path(), LocalStorageOptions::for_testing());
        assert!(matches!(result, Err(raftlog_core::Error::Serialization(_))));
    }
}

//! Storage configuration
//!
//! Two layers, mirroring how the backend is wired:
//! - the process-wide `raft_sync` flag, reloadable at runtime, read when a
//!   factory builds a storage
//! - `LocalStorageOptions`, the per-instance copy the local backend uses

use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;
use tracing::{info, warn};

/// Environment variable holding the initial `raft_sync` value
pub const RAFT_SYNC_ENV: &str = "RAFT_SYNC";

/// `raft_sync` value when the environment does not set one
pub const DEFAULT_RAFT_SYNC: bool = true;

/// Whether storages call fsync when they need durability
static RAFT_SYNC: Lazy<AtomicBool> = Lazy::new(|| AtomicBool::new(initial_raft_sync()));

fn initial_raft_sync() -> bool {
    match std::env::var(RAFT_SYNC_ENV) {
        Ok(value) => match parse_flag(&value) {
            Ok(flag) => flag,
            Err(e) => {
                warn!(error = %e, default = DEFAULT_RAFT_SYNC, "ignoring {}", RAFT_SYNC_ENV);
                DEFAULT_RAFT_SYNC
            }
        },
        Err(_) => DEFAULT_RAFT_SYNC,
    }
}

/// Current value of the `raft_sync` flag
pub fn raft_sync() -> bool {
    RAFT_SYNC.load(Ordering::Relaxed)
}

/// Change the `raft_sync` flag
///
/// Affects storages created afterwards; existing instances keep the value
/// they were built with.
pub fn set_raft_sync(value: bool) {
    RAFT_SYNC.store(value, Ordering::Relaxed);
    info!(raft_sync = value, "raft_sync flag updated");
}

/// Change the `raft_sync` flag from its textual form
///
/// # Errors
///
/// Returns `ConfigError::InvalidFlagValue` and leaves the flag unchanged if
/// `value` is not a boolean.
pub fn set_raft_sync_from_str(value: &str) -> Result<(), ConfigError> {
    let flag = parse_flag(value)?;
    set_raft_sync(flag);
    Ok(())
}

/// Parse a boolean flag value
///
/// Accepts `true/false`, `1/0`, `yes/no` and `on/off`, case-insensitively,
/// with surrounding whitespace ignored.
pub fn parse_flag(value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlagValue(value.to_string())),
    }
}

/// Options for the local-filesystem backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalStorageOptions {
    /// fsync files and directories after writes
    pub sync: bool,
}

impl Default for LocalStorageOptions {
    fn default() -> Self {
        LocalStorageOptions {
            sync: DEFAULT_RAFT_SYNC,
        }
    }
}

impl LocalStorageOptions {
    /// Create options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Options reflecting the current `raft_sync` flag
    pub fn from_flags() -> Self {
        LocalStorageOptions { sync: raft_sync() }
    }

    /// Set fsync behavior (builder pattern)
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Create options for testing (no fsync)
    pub fn for_testing() -> Self {
        LocalStorageOptions { sync: false }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Flag value is not a boolean
    #[error("Invalid flag value: {0:?}")]
    InvalidFlagValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag_true() {
        for value in ["true", "TRUE", "1", "yes", "On", " true "] {
            assert_eq!(parse_flag(value), Ok(true), "value {:?}", value);
        }
    }

    #[test]
    fn test_parse_flag_false() {
        for value in ["false", "False", "0", "no", "OFF"] {
            assert_eq!(parse_flag(value), Ok(false), "value {:?}", value);
        }
    }

    #[test]
    fn test_parse_flag_invalid() {
        assert_eq!(
            parse_flag("maybe"),
            Err(ConfigError::InvalidFlagValue("maybe".to_string()))
        );
        assert!(parse_flag("").is_err());
    }

    #[test]
    fn test_set_raft_sync_from_str_rejects_invalid() {
        assert!(set_raft_sync_from_str("sometimes").is_err());
    }

    #[test]
    fn test_raft_sync_reloadable() {
        let original = raft_sync();

        set_raft_sync_from_str("off").unwrap();
        assert!(!raft_sync());
        assert!(!LocalStorageOptions::from_flags().sync);

        set_raft_sync(true);
        assert!(raft_sync());
        assert!(LocalStorageOptions::from_flags().sync);

        set_raft_sync(original);
    }

    #[test]
    fn test_default_options() {
        let options = LocalStorageOptions::default();
        assert_eq!(options.sync, DEFAULT_RAFT_SYNC);
    }

    #[test]
    fn test_builder_pattern() {
        let options = LocalStorageOptions::new().with_sync(false);
        assert!(!options.sync);
        assert_eq!(options, LocalStorageOptions::for_testing());
    }
}

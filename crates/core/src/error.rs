//! Error types for raftlog storage
//!
//! This module defines the error type returned by storage backends and
//! their factories. We use `thiserror` for `Display` and `Error` impls.

use std::io;
use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for storage backends
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations, directory sync, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// URI could not be turned into backend-specific configuration
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Caller passed an argument the storage cannot accept
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Persisted data failed validation
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Snapshot I/O failed; carries the accumulated error state
    #[error("Snapshot error (code {code}): {text}")]
    Snapshot {
        /// errno-style status code
        code: i32,
        /// Accumulated diagnostic trail
        text: String,
    },
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

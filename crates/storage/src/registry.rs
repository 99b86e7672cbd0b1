//! Storage backend registry
//!
//! Backends register under a URI scheme and are later resolved from a URI
//! string alone, so callers never name a concrete storage type.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut registry = init_storage()?;  // `file` backend pre-registered
//!
//! // Register another backend (scheme taken from the URI)
//! registry.register_storage("mem://", mem_descriptor)?;
//!
//! // Share it once registration is done; lookups only need `&self`
//! let registry = Arc::new(registry);
//! let descriptor = registry.find_storage("mem://raft/log").unwrap();
//! let log = (descriptor.log_storage_factory)("mem://raft/log")?;
//! ```
//!
//! ## Registration before sharing
//!
//! `register_storage` takes `&mut self` and `find_storage` takes `&self`.
//! Once the registry is behind an `Arc` it can no longer change, so every
//! registration happens-before any concurrent lookup. There is no internal
//! lock and no unregistration.

use std::fmt;

use raftlog_core::{LogStorage, Result, SnapshotStorage, StableStorage, EINVAL, ENOSPC};
use tracing::{error, info, warn};

use crate::local::{
    create_local_log_storage, create_local_snapshot_storage, create_local_stable_storage,
};
use crate::uri::{lookup_scheme, registration_scheme};

/// Maximum number of backends a registry holds
pub const MAX_STORAGE_SIZE: usize = 16;

/// Scheme of the built-in local-filesystem backend
pub const LOCAL_STORAGE_SCHEME: &str = "file";

/// Builds a log storage for a URI
pub type LogStorageFactory = fn(&str) -> Result<Box<dyn LogStorage>>;

/// Builds a stable storage for a URI
pub type StableStorageFactory = fn(&str) -> Result<Box<dyn StableStorage>>;

/// Builds a snapshot storage for a URI
pub type SnapshotStorageFactory = fn(&str) -> Result<Box<dyn SnapshotStorage>>;

/// A registered backend: its scheme and its three factories
#[derive(Clone)]
pub struct StorageDescriptor {
    /// Registered scheme; overwritten by the registry on registration
    pub name: String,
    /// Log storage factory
    pub log_storage_factory: LogStorageFactory,
    /// Stable storage factory
    pub stable_storage_factory: StableStorageFactory,
    /// Snapshot storage factory
    pub snapshot_storage_factory: SnapshotStorageFactory,
}

impl StorageDescriptor {
    /// Create a descriptor
    pub fn new(
        name: impl Into<String>,
        log_storage_factory: LogStorageFactory,
        stable_storage_factory: StableStorageFactory,
        snapshot_storage_factory: SnapshotStorageFactory,
    ) -> Self {
        StorageDescriptor {
            name: name.into(),
            log_storage_factory,
            stable_storage_factory,
            snapshot_storage_factory,
        }
    }
}

impl fmt::Debug for StorageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageDescriptor")
            .field("name", &self.name)
            .finish()
    }
}

/// Errors from backend registration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// URI has no non-empty scheme
    #[error("Storage URI {uri:?} bad format")]
    InvalidFormat {
        /// URI as given
        uri: String,
    },

    /// Scheme is already taken
    #[error("Storage {scheme} register failed, storage exist")]
    AlreadyRegistered {
        /// Scheme that was registered twice
        scheme: String,
    },

    /// Every slot is occupied
    #[error("Storage {scheme} register failed, storage map full ({capacity} entries)")]
    RegistryFull {
        /// Scheme that did not fit
        scheme: String,
        /// Registry capacity
        capacity: usize,
    },
}

impl RegistryError {
    /// errno-style code for this error
    ///
    /// `InvalidFormat` and `AlreadyRegistered` map to `EINVAL`,
    /// `RegistryFull` maps to `ENOSPC`.
    pub fn errno(&self) -> i32 {
        match self {
            RegistryError::InvalidFormat { .. } | RegistryError::AlreadyRegistered { .. } => {
                EINVAL
            }
            RegistryError::RegistryFull { .. } => ENOSPC,
        }
    }
}

/// Append-only table of storage backends, keyed by scheme
///
/// Entries keep registration order and are never removed or replaced.
pub struct StorageRegistry {
    storages: Vec<StorageDescriptor>,
}

impl StorageRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        StorageRegistry {
            storages: Vec::with_capacity(MAX_STORAGE_SIZE),
        }
    }

    /// Register a backend under the scheme of `uri`
    ///
    /// The scheme is the first non-empty `:`-separated field of `uri`, and
    /// replaces `descriptor.name`.
    ///
    /// # Errors
    ///
    /// - `InvalidFormat` if `uri` has no non-empty field
    /// - `AlreadyRegistered` if the scheme is taken (table unchanged)
    /// - `RegistryFull` if all `MAX_STORAGE_SIZE` slots are used
    pub fn register_storage(
        &mut self,
        uri: &str,
        mut descriptor: StorageDescriptor,
    ) -> std::result::Result<(), RegistryError> {
        let scheme = match registration_scheme(uri) {
            Some(scheme) => scheme,
            None => {
                warn!(uri, "storage bad format");
                return Err(RegistryError::InvalidFormat {
                    uri: uri.to_string(),
                });
            }
        };

        if self.contains(scheme) {
            warn!(scheme, "storage register failed, storage exist");
            return Err(RegistryError::AlreadyRegistered {
                scheme: scheme.to_string(),
            });
        }

        if self.storages.len() >= MAX_STORAGE_SIZE {
            warn!(scheme, "storage register failed, storage map full");
            return Err(RegistryError::RegistryFull {
                scheme: scheme.to_string(),
                capacity: MAX_STORAGE_SIZE,
            });
        }

        descriptor.name = scheme.to_string();
        self.storages.push(descriptor);
        info!(scheme, "storage registered");
        Ok(())
    }

    /// Resolve the backend for `uri`
    ///
    /// URIs containing `://` use the text before the first `:` as scheme;
    /// anything else resolves to the `file` backend. Returns `None` when
    /// the scheme is empty or not registered.
    pub fn find_storage(&self, uri: &str) -> Option<&StorageDescriptor> {
        let scheme = lookup_scheme(uri);
        if scheme.is_empty() {
            warn!(uri, "storage bad format");
            return None;
        }

        let found = self.storages.iter().find(|s| s.name == scheme);
        if found.is_none() {
            warn!(uri, "storage not found");
        }
        found
    }

    /// Register the local-filesystem backend under `file://`
    pub fn register_builtin(&mut self) -> std::result::Result<(), RegistryError> {
        self.register_storage("file://", local_storage_descriptor())
    }

    /// Check if a scheme is registered
    pub fn contains(&self, scheme: &str) -> bool {
        self.storages.iter().any(|s| s.name == scheme)
    }

    /// Registered schemes in registration order
    pub fn schemes(&self) -> Vec<&str> {
        self.storages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Number of registered backends
    pub fn len(&self) -> usize {
        self.storages.len()
    }

    /// Check if no backend is registered
    pub fn is_empty(&self) -> bool {
        self.storages.is_empty()
    }

    /// Maximum number of backends
    pub fn capacity(&self) -> usize {
        MAX_STORAGE_SIZE
    }
}

impl Default for StorageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageRegistry")
            .field("storage_count", &self.storages.len())
            .field("schemes", &self.schemes())
            .finish()
    }
}

/// Descriptor of the built-in local-filesystem backend
pub fn local_storage_descriptor() -> StorageDescriptor {
    StorageDescriptor::new(
        LOCAL_STORAGE_SCHEME,
        create_local_log_storage,
        create_local_stable_storage,
        create_local_snapshot_storage,
    )
}

/// Create a registry with the local backend registered under `file`
///
/// # Errors
///
/// Fails only if the built-in backend cannot be registered. The process
/// cannot run without it, so callers should treat this as fatal.
pub fn init_storage() -> std::result::Result<StorageRegistry, RegistryError> {
    let mut registry = StorageRegistry::new();
    if let Err(e) = registry.register_builtin() {
        error!(error = %e, "register storage failed, storage file");
        return Err(e);
    }
    Ok(registry)
}

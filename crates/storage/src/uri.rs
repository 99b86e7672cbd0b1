//! URI scheme extraction
//!
//! Registration and lookup derive the scheme differently:
//!
//! | Input | `registration_scheme` | `lookup_scheme` |
//! |-------|-----------------------|-----------------|
//! | `file:///data` | `file` | `file` |
//! | `:mem://x` | `mem` | `""` (bad format) |
//! | `/tmp/data` | `/tmp/data` | `file` (default) |
//! | `:::` | `None` | `file` (default) |
//!
//! Registration skips leading empty `:`-separated fields. Lookup takes the
//! text before the first `:` verbatim, and only when the URI contains `://`.

use std::path::PathBuf;

use raftlog_core::{Error, Result};

/// Scheme assumed for URIs without `://`
pub const DEFAULT_SCHEME: &str = "file";

/// Separator between scheme and backend-specific part
pub const SCHEME_SEPARATOR: &str = "://";

/// Scheme used when registering a backend
///
/// Returns the first non-empty `:`-separated field, or `None` when every
/// field is empty.
pub fn registration_scheme(uri: &str) -> Option<&str> {
    uri.split(':').find(|field| !field.is_empty())
}

/// Scheme used when looking a backend up
///
/// The result may be empty for malformed input such as `":foo://x"`.
pub fn lookup_scheme(uri: &str) -> &str {
    if !uri.contains(SCHEME_SEPARATOR) {
        return DEFAULT_SCHEME;
    }
    uri.split(':').next().unwrap_or_default()
}

/// Filesystem path addressed by a local-backend URI
///
/// `file:///data/log` becomes `/data/log`; a bare path is used as-is.
///
/// # Errors
///
/// Returns `Error::InvalidUri` if the path part is empty.
pub fn local_path(uri: &str) -> Result<PathBuf> {
    let path = match uri.find(SCHEME_SEPARATOR) {
        Some(pos) => &uri[pos + SCHEME_SEPARATOR.len()..],
        None => uri,
    };
    if path.is_empty() {
        return Err(Error::InvalidUri(uri.to_string()));
    }
    Ok(PathBuf::from(path))
}

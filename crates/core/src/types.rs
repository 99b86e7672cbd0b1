//! Data carried by log and snapshot storages

use serde::{Deserialize, Serialize};

/// A single replicated-log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the log (1-based, contiguous)
    pub index: u64,
    /// Term in which the entry was created
    pub term: u64,
    /// Opaque payload
    pub data: Vec<u8>,
}

impl LogEntry {
    /// Create a new log entry
    pub fn new(index: u64, term: u64, data: impl Into<Vec<u8>>) -> Self {
        LogEntry {
            index,
            term,
            data: data.into(),
        }
    }
}

/// A file recorded in a snapshot, with its CRC32 checksum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFile {
    /// File name relative to the snapshot directory
    pub name: String,
    /// CRC32 of the file contents
    pub crc32: u32,
}

/// Snapshot metadata
///
/// Describes the log position a snapshot covers and the files it contains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Index of the last log entry included in the snapshot
    pub last_included_index: u64,
    /// Term of the last log entry included in the snapshot
    pub last_included_term: u64,
    /// Cluster configuration at `last_included_index`
    #[serde(default)]
    pub peers: Vec<String>,
    /// Files added to the snapshot
    #[serde(default)]
    pub files: Vec<SnapshotFile>,
}

impl SnapshotMeta {
    /// Create meta for the given log position with no peers or files
    pub fn new(last_included_index: u64, last_included_term: u64) -> Self {
        SnapshotMeta {
            last_included_index,
            last_included_term,
            ..Default::default()
        }
    }

    /// Set the peer list (builder pattern)
    pub fn with_peers(mut self, peers: Vec<String>) -> Self {
        self.peers = peers;
        self
    }

    /// Look up a recorded file by name
    pub fn find_file(&self, name: &str) -> Option<&SnapshotFile> {
        self.files.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entry_new() {
        let entry = LogEntry::new(3, 2, b"payload".to_vec());
        assert_eq!(entry.index, 3);
        assert_eq!(entry.term, 2);
        assert_eq!(entry.data, b"payload");
    }

    #[test]
    fn test_snapshot_meta_builder() {
        let meta = SnapshotMeta::new(10, 3).with_peers(vec!["127.0.0.1:8000".to_string()]);
        assert_eq!(meta.last_included_index, 10);
        assert_eq!(meta.last_included_term, 3);
        assert_eq!(meta.peers.len(), 1);
        assert!(meta.files.is_empty());
    }

    #[test]
    fn test_snapshot_meta_missing_optional_fields() {
        let meta: SnapshotMeta =
            serde_json::from_str(r#"{"last_included_index":5,"last_included_term":1}"#).unwrap();
        assert_eq!(meta, SnapshotMeta::new(5, 1));
    }

    #[test]
    fn test_find_file() {
        let mut meta = SnapshotMeta::new(1, 1);
        meta.files.push(SnapshotFile {
            name: "data".to_string(),
            crc32: 7,
        });
        assert_eq!(meta.find_file("data").map(|f| f.crc32), Some(7));
        assert!(meta.find_file("other").is_none());
    }
}

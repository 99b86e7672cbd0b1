//! Local log storage
//!
//! Entries live in a single append-only `log_data` file. Each record:
//!
//! ```text
//! +----------+----------+----------+----------+----------------+
//! | data_len | crc32    | index    | term     | data           |
//! | u32 LE   | u32 LE   | u64 LE   | u64 LE   | data_len bytes |
//! +----------+----------+----------+----------+----------------+
//! ```
//!
//! The CRC covers index, term and data. On open the file is replayed; a
//! torn or corrupted tail (from a crash mid-append) is truncated away.
//!
//! `log_meta` records the first log index, which only matters while the
//! data file is empty: otherwise the first record's index wins.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use raftlog_core::{Error, LogEntry, LogStorage, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::write_atomic;
use crate::config::LocalStorageOptions;

/// Data file name
pub const LOG_DATA_FILE: &str = "log_data";

/// Meta file name
pub const LOG_META_FILE: &str = "log_meta";

/// Bytes before the payload of each record
pub const RECORD_HEADER_SIZE: usize = 24;

#[derive(Debug, Serialize, Deserialize)]
struct LogMeta {
    first_log_index: u64,
}

struct LogState {
    file: File,
    first_log_index: u64,
    /// File offset of entry `first_log_index + i`
    offsets: Vec<u64>,
    /// Term of entry `first_log_index + i`
    terms: Vec<u64>,
    /// Offset one past the last valid record
    end_offset: u64,
}

impl LogState {
    fn last_log_index(&self) -> u64 {
        self.first_log_index + self.offsets.len() as u64 - 1
    }

    fn position(&self, index: u64) -> Option<usize> {
        if index < self.first_log_index || index > self.last_log_index() {
            return None;
        }
        Some((index - self.first_log_index) as usize)
    }
}

/// Log storage backed by a local directory
pub struct LocalLogStorage {
    dir: PathBuf,
    options: LocalStorageOptions,
    state: Mutex<LogState>,
}

impl LocalLogStorage {
    /// Open (or create) the log in `dir`
    ///
    /// Replays `log_data`, truncating any torn or corrupted tail.
    pub fn open(dir: impl Into<PathBuf>, options: LocalStorageOptions) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let meta_path = dir.join(LOG_META_FILE);
        let meta_first = if meta_path.exists() {
            let meta: LogMeta = serde_json::from_slice(&std::fs::read(&meta_path)?)?;
            meta.first_log_index
        } else {
            1
        };

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOG_DATA_FILE))?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let (first_log_index, offsets, terms, end_offset) = replay(&data, meta_first);
        if first_log_index == 0 {
            return Err(Error::Corruption(format!(
                "first log index 0 in {}",
                dir.display()
            )));
        }

        if end_offset < data.len() as u64 {
            warn!(
                path = %dir.display(),
                valid_bytes = end_offset,
                file_bytes = data.len(),
                "Truncating corrupted log tail"
            );
            file.set_len(end_offset)?;
            if options.sync {
                file.sync_data()?;
            }
        }

        debug!(
            path = %dir.display(),
            first_log_index,
            entries = offsets.len(),
            "Opened local log storage"
        );

        Ok(LocalLogStorage {
            dir,
            options,
            state: Mutex::new(LogState {
                file,
                first_log_index,
                offsets,
                terms,
                end_offset,
            }),
        })
    }

    /// Directory holding the log files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn save_meta(&self, first_log_index: u64) -> Result<()> {
        let bytes = serde_json::to_vec(&LogMeta { first_log_index })?;
        write_atomic(&self.dir.join(LOG_META_FILE), &bytes, self.options.sync)?;
        Ok(())
    }
}

/// Parse records, stopping at the first torn, corrupted or non-contiguous one
fn replay(data: &[u8], meta_first: u64) -> (u64, Vec<u64>, Vec<u64>, u64) {
    let mut first_log_index = meta_first;
    let mut offsets = Vec::new();
    let mut terms = Vec::new();
    let mut cursor = 0usize;

    while cursor < data.len() {
        let (entry, len) = match decode_record(&data[cursor..]) {
            Some(record) => record,
            None => break,
        };

        if offsets.is_empty() {
            first_log_index = entry.index;
        } else if entry.index != first_log_index + offsets.len() as u64 {
            break;
        }

        offsets.push(cursor as u64);
        terms.push(entry.term);
        cursor += len;
    }

    (first_log_index, offsets, terms, cursor as u64)
}

/// Payload length as stored in the record header
fn record_data_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        Error::InvalidArgument(format!(
            "log entry payload of {} bytes exceeds {} bytes",
            len,
            u32::MAX
        ))
    })
}

fn encode_record(entry: &LogEntry) -> Result<Vec<u8>> {
    let data_len = record_data_len(entry.data.len())?;
    let mut body = Vec::with_capacity(16 + entry.data.len());
    body.write_u64::<LittleEndian>(entry.index)?;
    body.write_u64::<LittleEndian>(entry.term)?;
    body.extend_from_slice(&entry.data);

    let mut buf = Vec::with_capacity(8 + body.len());
    buf.write_u32::<LittleEndian>(data_len)?;
    buf.write_u32::<LittleEndian>(crc32fast::hash(&body))?;
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Decode one record from the front of `bytes`
///
/// Returns the entry and the record's total length, or `None` if the
/// record is incomplete or fails its CRC.
fn decode_record(bytes: &[u8]) -> Option<(LogEntry, usize)> {
    if bytes.len() < RECORD_HEADER_SIZE {
        return None;
    }
    let mut header = &bytes[..8];
    let data_len = header.read_u32::<LittleEndian>().ok()? as usize;
    let stored_crc = header.read_u32::<LittleEndian>().ok()?;

    let total = RECORD_HEADER_SIZE + data_len;
    if bytes.len() < total {
        return None;
    }
    let body = &bytes[8..total];
    if crc32fast::hash(body) != stored_crc {
        return None;
    }

    let mut ids = &body[..16];
    let index = ids.read_u64::<LittleEndian>().ok()?;
    let term = ids.read_u64::<LittleEndian>().ok()?;
    Some((LogEntry::new(index, term, body[16..].to_vec()), total))
}

impl LogStorage for LocalLogStorage {
    fn first_log_index(&self) -> u64 {
        self.state.lock().first_log_index
    }

    fn last_log_index(&self) -> u64 {
        self.state.lock().last_log_index()
    }

    fn get_entry(&self, index: u64) -> Result<Option<LogEntry>> {
        let mut state = self.state.lock();
        let pos = match state.position(index) {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let start = state.offsets[pos];
        let end = state
            .offsets
            .get(pos + 1)
            .copied()
            .unwrap_or(state.end_offset);

        let mut bytes = vec![0u8; (end - start) as usize];
        state.file.seek(SeekFrom::Start(start))?;
        state.file.read_exact(&mut bytes)?;

        match decode_record(&bytes) {
            Some((entry, _)) if entry.index == index => Ok(Some(entry)),
            _ => Err(Error::Corruption(format!(
                "log record {} at offset {} in {}",
                index,
                start,
                self.dir.display()
            ))),
        }
    }

    fn get_term(&self, index: u64) -> u64 {
        let state = self.state.lock();
        state.position(index).map(|pos| state.terms[pos]).unwrap_or(0)
    }

    fn append_entry(&self, entry: &LogEntry) -> Result<()> {
        let mut state = self.state.lock();
        let expected = state.last_log_index() + 1;
        if entry.index != expected {
            return Err(Error::InvalidArgument(format!(
                "log entry index {} is not contiguous, expected {}",
                entry.index, expected
            )));
        }

        let record = encode_record(entry)?;
        let offset = state.end_offset;
        state.file.seek(SeekFrom::Start(offset))?;
        state.file.write_all(&record)?;
        if self.options.sync {
            state.file.sync_data()?;
        }

        state.offsets.push(offset);
        state.terms.push(entry.term);
        state.end_offset = offset + record.len() as u64;
        Ok(())
    }

    fn truncate_prefix(&self, first_index_kept: u64) -> Result<()> {
        let mut state = self.state.lock();
        if first_index_kept <= state.first_log_index {
            return Ok(());
        }

        let dropped = ((first_index_kept - state.first_log_index) as usize).min(state.offsets.len());
        let cut = state
            .offsets
            .get(dropped)
            .copied()
            .unwrap_or(state.end_offset);

        // Meta first: while the data file is non-empty its first record wins.
        self.save_meta(first_index_kept)?;

        let mut kept = vec![0u8; (state.end_offset - cut) as usize];
        state.file.seek(SeekFrom::Start(cut))?;
        state.file.read_exact(&mut kept)?;

        let data_path = self.dir.join(LOG_DATA_FILE);
        write_atomic(&data_path, &kept, self.options.sync)?;
        state.file = OpenOptions::new().read(true).write(true).open(&data_path)?;

        let offsets = state.offsets.split_off(dropped);
        let terms = state.terms.split_off(dropped);
        state.offsets = offsets;
        state.terms = terms;
        for offset in state.offsets.iter_mut() {
            *offset -= cut;
        }
        state.end_offset -= cut;
        state.first_log_index = first_index_kept;

        debug!(path = %self.dir.display(), first_index_kept, "Truncated log prefix");
        Ok(())
    }

    fn truncate_suffix(&self, last_index_kept: u64) -> Result<()> {
        let mut state = self.state.lock();
        if state.offsets.is_empty() || last_index_kept >= state.last_log_index() {
            return Ok(());
        }

        let kept = last_index_kept
            .saturating_sub(state.first_log_index - 1)
            .min(state.offsets.len() as u64) as usize;
        let cut = state.offsets[kept];

        state.file.set_len(cut)?;
        if self.options.sync {
            state.file.sync_data()?;
        }

        state.offsets.truncate(kept);
        state.terms.truncate(kept);
        state.end_offset = cut;

        debug!(path = %self.dir.display(), last_index_kept, "Truncated log suffix");
        Ok(())
    }

    fn reset(&self, next_log_index: u64) -> Result<()> {
        if next_log_index == 0 {
            return Err(Error::InvalidArgument(
                "next log index must be positive".to_string(),
            ));
        }

        let mut state = self.state.lock();
        self.save_meta(next_log_index)?;

        state.file.set_len(0)?;
        if self.options.sync {
            state.file.sync_data()?;
        }

        state.offsets.clear();
        state.terms.clear();
        state.end_offset = 0;
        state.first_log_index = next_log_index;

        debug!(path = %self.dir.display(), next_log_index, "Reset log");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(dir: &Path) -> LocalLogStorage {
        LocalLogStorage::open(dir, LocalStorageOptions::for_testing()).unwrap()
    }

    fn fill(log: &LocalLogStorage, from: u64, to: u64) {
        for index in from..=to {
            log.append_entry(&LogEntry::new(index, index / 3 + 1, format!("entry-{}", index)))
                .unwrap();
        }
    }

    #[test]
    fn test_empty_log() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log = open(temp_dir.path());

        assert_eq!(log.first_log_index(), 1);
        assert_eq!(log.last_log_index(), 0);
        assert!(log.get_entry(1).unwrap().is_none());
        assert_eq!(log.get_term(1), 0);
    }

    #[test]
    fn test_append_and_get() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log = open(temp_dir.path());
        fill(&log, 1, 5);

        assert_eq!(log.last_log_index(), 5);
        let entry = log.get_entry(4).unwrap().unwrap();
        assert_eq!(entry.index, 4);
        assert_eq!(entry.term, 2);
        assert_eq!(entry.data, b"entry-4");
        assert_eq!(log.get_term(5), 2);
        assert!(log.get_entry(6).unwrap().is_none());
    }

    #[test]
    fn test_append_rejects_gap() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log = open(temp_dir.path());
        fill(&log, 1, 2);

        let err = log.append_entry(&LogEntry::new(4, 1, b"x".to_vec())).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(log.last_log_index(), 2);
    }

    #[test]
    fn test_append_entries_stops_at_gap() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log = open(temp_dir.path());

        let entries = vec![
            LogEntry::new(1, 1, b"a".to_vec()),
            LogEntry::new(2, 1, b"b".to_vec()),
            LogEntry::new(7, 1, b"c".to_vec()),
        ];
        assert_eq!(log.append_entries(&entries).unwrap(), 2);
        assert_eq!(log.last_log_index(), 2);
    }

    #[test]
    fn test_reopen_preserves_entries() {
        let temp_dir = tempfile::tempdir().unwrap();
        {
            let log = open(temp_dir.path());
            fill(&log, 1, 10);
        }

        let log = open(temp_dir.path());
        assert_eq!(log.first_log_index(), 1);
        assert_eq!(log.last_log_index(), 10);
        assert_eq!(log.get_entry(10).unwrap().unwrap().data, b"entry-10");
    }

    #[test]
    fn test_truncate_suffix() {
        let temp_dir = tempfile::tempdir().unwrap();
        {
            let log = open(temp_dir.path());
            fill(&log, 1, 10);
            log.truncate_suffix(6).unwrap();
            assert_eq!(log.last_log_index(), 6);

            // Appending continues after the kept suffix
            log.append_entry(&LogEntry::new(7, 9, b"replacement".to_vec()))
                .unwrap();
        }

        let log = open(temp_dir.path());
        assert_eq!(log.last_log_index(), 7);
        assert_eq!(log.get_term(7), 9);
        assert_eq!(log.get_entry(7).unwrap().unwrap().data, b"replacement");
    }

    #[test]
    fn test_truncate_suffix_everything() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log = open(temp_dir.path());
        fill(&log, 1, 3);

        log.truncate_suffix(0).unwrap();
        assert_eq!(log.first_log_index(), 1);
        assert_eq!(log.last_log_index(), 0);
    }

    #[test]
    fn test_truncate_prefix() {
        let temp_dir = tempfile::tempdir().unwrap();
        {
            let log = open(temp_dir.path());
            fill(&log, 1, 10);
            log.truncate_prefix(4).unwrap();

            assert_eq!(log.first_log_index(), 4);
            assert_eq!(log.last_log_index(), 10);
            assert!(log.get_entry(3).unwrap().is_none());
            assert_eq!(log.get_entry(4).unwrap().unwrap().data, b"entry-4");

            log.append_entry(&LogEntry::new(11, 4, b"after".to_vec()))
                .unwrap();
        }

        let log = open(temp_dir.path());
        assert_eq!(log.first_log_index(), 4);
        assert_eq!(log.last_log_index(), 11);
        assert_eq!(log.get_entry(11).unwrap().unwrap().data, b"after");
    }

    #[test]
    fn test_truncate_prefix_past_end() {
        let temp_dir = tempfile::tempdir().unwrap();
        {
            let log = open(temp_dir.path());
            fill(&log, 1, 3);
            log.truncate_prefix(20).unwrap();
            assert_eq!(log.first_log_index(), 20);
            assert_eq!(log.last_log_index(), 19);
        }

        let log = open(temp_dir.path());
        assert_eq!(log.first_log_index(), 20);
        log.append_entry(&LogEntry::new(20, 5, b"x".to_vec())).unwrap();
    }

    #[test]
    fn test_reset() {
        let temp_dir = tempfile::tempdir().unwrap();
        {
            let log = open(temp_dir.path());
            fill(&log, 1, 5);
            log.reset(100).unwrap();
            assert_eq!(log.first_log_index(), 100);
            assert_eq!(log.last_log_index(), 99);
        }

        let log = open(temp_dir.path());
        assert_eq!(log.first_log_index(), 100);
        assert!(log.get_entry(3).unwrap().is_none());
    }

    #[test]
    fn test_reset_rejects_zero() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log = open(temp_dir.path());
        assert!(matches!(log.reset(0), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let temp_dir = tempfile::tempdir().unwrap();
        {
            let log = open(temp_dir.path());
            fill(&log, 1, 3);
        }

        // Simulate a crash halfway through the next append
        let data_path = temp_dir.path().join(LOG_DATA_FILE);
        let valid_len = std::fs::metadata(&data_path).unwrap().len();
        let partial = encode_record(&LogEntry::new(4, 2, b"lost".to_vec())).unwrap();
        let mut file = OpenOptions::new().append(true).open(&data_path).unwrap();
        file.write_all(&partial[..partial.len() / 2]).unwrap();
        drop(file);

        let log = open(temp_dir.path());
        assert_eq!(log.last_log_index(), 3);
        assert_eq!(std::fs::metadata(&data_path).unwrap().len(), valid_len);
    }

    #[test]
    fn test_crc_mismatch_drops_tail() {
        let temp_dir = tempfile::tempdir().unwrap();
        {
            let log = open(temp_dir.path());
            fill(&log, 1, 3);
        }

        // Flip the last payload byte of entry 3
        let data_path = temp_dir.path().join(LOG_DATA_FILE);
        let mut bytes = std::fs::read(&data_path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&data_path, &bytes).unwrap();

        let log = open(temp_dir.path());
        assert_eq!(log.last_log_index(), 2);
    }

    #[test]
    fn test_zero_first_index_in_meta_fails_open() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            temp_dir.path().join(LOG_META_FILE),
            br#"{"first_log_index":0}"#,
        )
        .unwrap();

        let result = LocalLogStorage::open(temp_dir.path(), LocalStorageOptions::for_testing());
        assert!(matches!(result, Err(Error::Corruption(_))));
    }

    #[test]
    fn test_record_data_len_limit() {
        assert_eq!(record_data_len(0).unwrap(), 0);
        assert_eq!(record_data_len(u32::MAX as usize).unwrap(), u32::MAX);
        assert!(matches!(
            record_data_len(u32::MAX as usize + 1),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_record_layout() {
        let record = encode_record(&LogEntry::new(7, 3, b"abc".to_vec())).unwrap();
        assert_eq!(record.len(), RECORD_HEADER_SIZE + 3);
        assert_eq!(u32::from_le_bytes(record[0..4].try_into().unwrap()), 3);
        assert_eq!(u64::from_le_bytes(record[8..16].try_into().unwrap()), 7);
        assert_eq!(u64::from_le_bytes(record[16..24].try_into().unwrap()), 3);

        let (entry, len) = decode_record(&record).unwrap();
        assert_eq!(entry, LogEntry::new(7, 3, b"abc".to_vec()));
        assert_eq!(len, record.len());
    }

    #[test]
    fn test_log_storage_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LocalLogStorage>();
    }
}

//! Local snapshot storage
//!
//! A snapshot is a directory. Writers fill `temp/`; committing renames it to
//! `snapshot_<last_included_index>` (zero-padded to 20 digits) and removes
//! older snapshots, so either the complete snapshot is visible or none is.
//!
//! Every snapshot directory holds `__raft_snapshot_meta` (JSON
//! [`SnapshotMeta`]) listing its files with their CRC32 checksums.
//!
//! Writers and readers record failures in their [`ErrorState`]; each layer
//! appends its own context, e.g.
//!
//! ```text
//! read /data/snap/snapshot_00000000000000000042/data: No such file or directory (os error 2); read snapshot file data failed
//! ```

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use raftlog_core::{
    Error, ErrorReporting, ErrorState, Result, SnapshotFile, SnapshotMeta, SnapshotReader,
    SnapshotStorage, SnapshotWriter, EINVAL, EIO, ENOENT,
};
use tracing::{debug, info, warn};

use super::{sync_dir, write_atomic};
use crate::config::LocalStorageOptions;

/// Meta file name inside each snapshot directory
pub const SNAPSHOT_META_FILE: &str = "__raft_snapshot_meta";

/// Directory used by the in-progress writer
pub const TEMP_DIR: &str = "temp";

/// Prefix of committed snapshot directories
pub const SNAPSHOT_DIR_PREFIX: &str = "snapshot_";

/// Suffix of a committed snapshot moved aside while a same-index one is installed
pub const STALE_SUFFIX: &str = ".stale";

/// Directory name of the snapshot covering `index`
pub fn snapshot_dir_name(index: u64) -> String {
    format!("{}{:020}", SNAPSHOT_DIR_PREFIX, index)
}

/// Parse a snapshot directory name back into its index
pub fn parse_snapshot_index(name: &str) -> Option<u64> {
    name.strip_prefix(SNAPSHOT_DIR_PREFIX)?.parse().ok()
}

/// Committed snapshot indexes in `dir`, ascending
fn list_snapshot_indexes(dir: &Path) -> io::Result<Vec<u64>> {
    let mut indexes = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(index) = parse_snapshot_index(&entry.file_name().to_string_lossy()) {
            indexes.push(index);
        }
    }
    indexes.sort_unstable();
    Ok(indexes)
}

fn stale_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(STALE_SUFFIX);
    PathBuf::from(name)
}

/// Resolve directories left aside by an interrupted install
///
/// A stale directory is moved back if its snapshot never got replaced,
/// and removed otherwise.
fn recover_stale_snapshots(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let final_name = match name.strip_suffix(STALE_SUFFIX) {
            Some(final_name) if parse_snapshot_index(final_name).is_some() => final_name,
            _ => continue,
        };

        let target = dir.join(final_name);
        if target.exists() {
            debug!(path = %entry.path().display(), "Removing replaced snapshot");
            fs::remove_dir_all(entry.path())?;
        } else {
            warn!(path = %target.display(), "Restoring snapshot from interrupted install");
            fs::rename(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn valid_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name != SNAPSHOT_META_FILE
        && !name.contains('/')
        && !name.contains('\\')
}

/// Snapshot storage backed by a local directory
#[derive(Debug)]
pub struct LocalSnapshotStorage {
    dir: PathBuf,
    options: LocalStorageOptions,
    last_snapshot_index: u64,
}

impl LocalSnapshotStorage {
    /// Open (or create) snapshot storage in `dir`
    ///
    /// Removes a leftover `temp/` from an interrupted writer and every
    /// snapshot except the newest.
    pub fn open(dir: impl Into<PathBuf>, options: LocalStorageOptions) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let temp_path = dir.join(TEMP_DIR);
        if temp_path.exists() {
            warn!(path = %temp_path.display(), "Removing incomplete snapshot");
            fs::remove_dir_all(&temp_path)?;
        }
        recover_stale_snapshots(&dir)?;

        let indexes = list_snapshot_indexes(&dir)?;
        let last_snapshot_index = indexes.last().copied().unwrap_or(0);
        for &index in indexes.iter().filter(|&&i| i != last_snapshot_index) {
            debug!(path = %dir.display(), index, "Removing stale snapshot");
            fs::remove_dir_all(dir.join(snapshot_dir_name(index)))?;
        }

        debug!(path = %dir.display(), last_snapshot_index, "Opened local snapshot storage");
        Ok(LocalSnapshotStorage {
            dir,
            options,
            last_snapshot_index,
        })
    }

    /// Directory holding the snapshots
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Index of the newest committed snapshot, 0 if none
    pub fn last_snapshot_index(&self) -> u64 {
        self.last_snapshot_index
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(TEMP_DIR)
    }

    fn discard(&self, path: &Path) {
        if let Err(e) = fs::remove_dir_all(path) {
            warn!(path = %path.display(), error = %e, "Failed to remove discarded snapshot");
        }
    }

    /// Move a finished snapshot into place, replacing one with the same index
    ///
    /// The replaced snapshot is moved aside first and only removed once the
    /// new one is in place; a failed rename moves it back.
    fn install(&self, from: &Path, to: &Path) -> io::Result<()> {
        let stale = stale_path(to);
        let replacing = to.exists();
        if replacing {
            if stale.exists() {
                fs::remove_dir_all(&stale)?;
            }
            fs::rename(to, &stale)?;
        }

        if let Err(e) = fs::rename(from, to) {
            if replacing {
                if let Err(restore) = fs::rename(&stale, to) {
                    warn!(
                        path = %stale.display(),
                        error = %restore,
                        "Failed to restore replaced snapshot"
                    );
                }
            }
            return Err(e);
        }

        if self.options.sync {
            sync_dir(&self.dir)?;
        }
        if replacing {
            self.discard(&stale);
        }
        Ok(())
    }

    fn commit(&mut self, writer: &mut dyn SnapshotWriter) -> Result<()> {
        if writer.path() != self.temp_path() {
            let foreign = writer.path().display().to_string();
            writer.set_error(
                EINVAL,
                format_args!("writer path {} does not belong to {}; ", foreign, self.dir.display()),
            );
            return Err(writer.error_state().to_error());
        }

        let meta = match writer.meta() {
            Some(meta) => meta.clone(),
            None => {
                writer.set_error(EINVAL, format_args!("snapshot meta was never saved; "));
                return Err(writer.error_state().to_error());
            }
        };
        if meta.files.len() != writer.list_files().len() {
            writer.set_error(EINVAL, format_args!("files were added after saving meta; "));
            return Err(writer.error_state().to_error());
        }

        let index = meta.last_included_index;
        let final_path = self.dir.join(snapshot_dir_name(index));
        if let Err(e) = self.install(writer.path(), &final_path) {
            writer
                .error_state_mut()
                .set_io_error(format_args!("rename to {}", final_path.display()), &e);
            return Err(writer.error_state().to_error());
        }

        for old in list_snapshot_indexes(&self.dir)?
            .into_iter()
            .filter(|&i| i != index)
        {
            self.discard(&self.dir.join(snapshot_dir_name(old)));
        }

        self.last_snapshot_index = index;
        info!(path = %final_path.display(), index, term = meta.last_included_term, "Snapshot committed");
        Ok(())
    }
}

impl SnapshotStorage for LocalSnapshotStorage {
    fn create(&mut self) -> Result<Box<dyn SnapshotWriter>> {
        let temp_path = self.temp_path();
        if temp_path.exists() {
            fs::remove_dir_all(&temp_path)?;
        }
        fs::create_dir_all(&temp_path)?;
        Ok(Box::new(LocalSnapshotWriter::new(temp_path, self.options)))
    }

    fn close_writer(&mut self, mut writer: Box<dyn SnapshotWriter>) -> Result<()> {
        let result = if writer.has_error() {
            Err(writer.error_state().to_error())
        } else {
            self.commit(&mut *writer)
        };

        if result.is_err() {
            warn!(
                path = %writer.path().display(),
                code = writer.error_code(),
                text = writer.error_text(),
                "Discarding failed snapshot"
            );
            if writer.path() == self.temp_path() {
                self.discard(writer.path());
            }
        }
        result
    }

    fn open(&mut self) -> Result<Option<Box<dyn SnapshotReader>>> {
        let newest = match list_snapshot_indexes(&self.dir)?.last() {
            Some(&index) => index,
            None => return Ok(None),
        };
        let path = self.dir.join(snapshot_dir_name(newest));
        Ok(Some(Box::new(LocalSnapshotReader::new(path))))
    }
}

/// Writes one snapshot into a local directory
#[derive(Debug)]
pub struct LocalSnapshotWriter {
    path: PathBuf,
    options: LocalStorageOptions,
    files: Vec<SnapshotFile>,
    meta: Option<SnapshotMeta>,
    error: ErrorState,
}

impl LocalSnapshotWriter {
    fn new(path: PathBuf, options: LocalStorageOptions) -> Self {
        LocalSnapshotWriter {
            path,
            options,
            files: Vec::new(),
            meta: None,
            error: ErrorState::new(),
        }
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(data)?;
        if self.options.sync {
            file.sync_all()?;
        }
        Ok(())
    }
}

impl ErrorReporting for LocalSnapshotWriter {
    fn error_state(&self) -> &ErrorState {
        &self.error
    }

    fn error_state_mut(&mut self) -> &mut ErrorState {
        &mut self.error
    }
}

impl SnapshotWriter for LocalSnapshotWriter {
    fn path(&self) -> &Path {
        &self.path
    }

    fn add_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        if self.meta.is_some() {
            self.error.set_error(
                EINVAL,
                format_args!("file {:?} added after snapshot meta was saved; ", name),
            );
            return Err(self.error.to_error());
        }
        if !valid_file_name(name) {
            self.error.set_error(EINVAL, format_args!("invalid snapshot file name {:?}; ", name));
            return Err(self.error.to_error());
        }

        let file_path = self.path.join(name);
        if let Err(e) = self.write_file(&file_path, data) {
            self.error
                .set_io_error(format_args!("write {}", file_path.display()), &e);
            return Err(self.error.to_error());
        }

        let file = SnapshotFile {
            name: name.to_string(),
            crc32: crc32fast::hash(data),
        };
        match self.files.iter_mut().find(|f| f.name == name) {
            Some(existing) => *existing = file,
            None => self.files.push(file),
        }
        Ok(())
    }

    fn save_meta(&mut self, meta: &SnapshotMeta) -> Result<()> {
        let mut meta = meta.clone();
        meta.files = self.files.clone();

        let meta_path = self.path.join(SNAPSHOT_META_FILE);
        let saved = serde_json::to_vec_pretty(&meta)
            .map_err(io::Error::from)
            .and_then(|bytes| write_atomic(&meta_path, &bytes, self.options.sync));
        if let Err(e) = saved {
            self.error
                .set_io_error(format_args!("save {}", meta_path.display()), &e);
            return Err(self.error.to_error());
        }

        self.meta = Some(meta);
        Ok(())
    }

    fn list_files(&self) -> Vec<String> {
        self.files.iter().map(|f| f.name.clone()).collect()
    }

    fn meta(&self) -> Option<&SnapshotMeta> {
        self.meta.as_ref()
    }
}

/// Reads one committed snapshot from a local directory
#[derive(Debug)]
pub struct LocalSnapshotReader {
    path: PathBuf,
    meta: Option<SnapshotMeta>,
    error: ErrorState,
}

impl LocalSnapshotReader {
    fn new(path: PathBuf) -> Self {
        LocalSnapshotReader {
            path,
            meta: None,
            error: ErrorState::new(),
        }
    }

    /// Read and parse the meta file, recording any failure in the error state
    fn read_meta(&mut self) -> Option<SnapshotMeta> {
        let meta_path = self.path.join(SNAPSHOT_META_FILE);
        let bytes = match fs::read(&meta_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.error
                    .set_io_error(format_args!("read {}", meta_path.display()), &e);
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(meta) => Some(meta),
            Err(e) => {
                self.error.set_error(
                    EINVAL,
                    format_args!("parse {}: {}; ", meta_path.display(), e),
                );
                None
            }
        }
    }
}

impl ErrorReporting for LocalSnapshotReader {
    fn error_state(&self) -> &ErrorState {
        &self.error
    }

    fn error_state_mut(&mut self) -> &mut ErrorState {
        &mut self.error
    }
}

impl SnapshotReader for LocalSnapshotReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn load_meta(&mut self) -> Result<SnapshotMeta> {
        if let Some(meta) = &self.meta {
            return Ok(meta.clone());
        }

        match self.read_meta() {
            Some(meta) => {
                self.meta = Some(meta.clone());
                Ok(meta)
            }
            None => {
                let code = self.error.error_code();
                self.error.set_error(code, format_args!("loading snapshot meta failed"));
                Err(self.error.to_error())
            }
        }
    }

    fn read_file(&mut self, name: &str) -> Result<Vec<u8>> {
        let meta = self.load_meta()?;

        let expected = match meta.find_file(name) {
            Some(file) => file.crc32,
            None => {
                self.error.set_error(
                    ENOENT,
                    format_args!("{} is not part of {}; ", name, self.path.display()),
                );
                self.error.set_error(ENOENT, format_args!("read snapshot file {} failed", name));
                return Err(self.error.to_error());
            }
        };

        let file_path = self.path.join(name);
        let data = match fs::read(&file_path) {
            Ok(data) => data,
            Err(e) => {
                self.error
                    .set_io_error(format_args!("read {}", file_path.display()), &e);
                let code = self.error.error_code();
                self.error.set_error(code, format_args!("read snapshot file {} failed", name));
                return Err(self.error.to_error());
            }
        };

        let actual = crc32fast::hash(&data);
        if actual != expected {
            self.error.set_error(
                EIO,
                format_args!(
                    "checksum mismatch for {}: expected {:08x}, got {:08x}; ",
                    file_path.display(),
                    expected,
                    actual
                ),
            );
            self.error.set_error(EIO, format_args!("read snapshot file {} failed", name));
            return Err(self.error.to_error());
        }

        Ok(data)
    }

    fn list_files(&mut self) -> Result<Vec<String>> {
        let meta = self.load_meta()?;
        Ok(meta.files.into_iter().map(|f| f.name).collect())
    }
}

use std::ffi::{OsStr, OsString};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::StoreResult;

/// Suffix of the transient sibling file written before the rename.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Prefix of every temp file. Record ids never start with it, so a temp
/// file can never be mistaken for a record whatever the store's extension.
pub const TEMP_PREFIX: &str = ".";

/// Flush/sync strategy for record writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` the temp file before the rename and the directory after it.
    EveryWrite,
    /// Flush to the OS and rely on page-cache write-back.
    OsDefault,
}

impl Default for SyncMode {
    fn default() -> Self {
        Self::EveryWrite
    }
}

/// Crash-safe put/get/delete of byte blobs keyed by path.
///
/// Each write goes to its own `.<name>.<random>.tmp` file in the target's
/// directory and is renamed over the target once complete, so a reader never
/// observes a half-written target. A failed write removes its temp file and
/// leaves the prior content of the target untouched.
///
/// There is no internal locking. Concurrent writers on one path never share
/// a temp file, so each stays atomic; which one wins is unspecified.
#[derive(Clone, Debug, Default)]
pub struct AtomicFileStore {
    sync_mode: SyncMode,
}

impl AtomicFileStore {
    /// Create a file store with the default [`SyncMode`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a file store with an explicit sync strategy.
    pub fn with_sync_mode(sync_mode: SyncMode) -> Self {
        Self { sync_mode }
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    /// Atomically replace the content at `path` with `bytes`.
    ///
    /// Parent directories are created if absent.
    pub fn write(&self, path: &Path, bytes: &[u8]) -> StoreResult<()> {
        let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent)?;
                parent
            }
            None => Path::new("."),
        };
        let file_name = path.file_name().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "path has no file name")
        })?;

        let mut temp = tempfile::Builder::new()
            .prefix(&temp_prefix(file_name))
            .suffix(TEMP_SUFFIX)
            .tempfile_in(parent)
            .inspect_err(|e| {
                error!(path = %path.display(), error = %e, "failed to create temp file");
            })?;

        // Dropping `temp` on any early return removes the temp file.
        if let Err(e) = self.write_temp(temp.as_file_mut(), bytes) {
            error!(path = %path.display(), error = %e, "failed to write temp file");
            return Err(e.into());
        }

        if let Err(e) = temp.persist(path) {
            error!(path = %path.display(), error = %e.error, "failed to move temp file into place");
            return Err(e.error.into());
        }

        if self.sync_mode == SyncMode::EveryWrite {
            sync_directory(parent);
        }

        debug!(path = %path.display(), len = bytes.len(), "atomic write");
        Ok(())
    }

    /// Read the content at `path`.
    ///
    /// Returns `Ok(None)` if `path` does not exist or is not a regular file.
    pub fn read(&self, path: &Path) -> StoreResult<Option<Vec<u8>>> {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            debug!(path = %path.display(), "not a regular file");
            return Ok(None);
        }

        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            // Deleted between the metadata check and the read.
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove `path`. Returns `Ok(true)` if it existed, `Ok(false)` if not.
    pub fn delete(&self, path: &Path) -> StoreResult<bool> {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "deleted");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to delete");
                Err(e.into())
            }
        }
    }

    /// Remove temp files left in `dir` by writes interrupted before their
    /// rename. The targets of those writes still hold their prior content.
    ///
    /// Returns the number of files removed; a missing `dir` counts as zero.
    pub fn sweep_temp_files(&self, dir: &Path) -> StoreResult<usize> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            if !is_temp_file_name(&entry.file_name().to_string_lossy()) || !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            warn!(path = %path.display(), "removing stale temp file");
            if self.delete(&path)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn write_temp(&self, file: &mut File, bytes: &[u8]) -> io::Result<()> {
        file.write_all(bytes)?;
        file.flush()?;
        if self.sync_mode == SyncMode::EveryWrite {
            file.sync_all()?;
        }
        Ok(())
    }
}

/// Whether `name` is a temp file left by [`AtomicFileStore::write`].
pub fn is_temp_file_name(name: &str) -> bool {
    name.len() > TEMP_PREFIX.len() + TEMP_SUFFIX.len()
        && name.starts_with(TEMP_PREFIX)
        && name.ends_with(TEMP_SUFFIX)
}

/// `.<file_name>.`; the builder appends random characters and the suffix.
fn temp_prefix(file_name: &OsStr) -> OsString {
    let mut prefix = OsString::from(TEMP_PREFIX);
    prefix.push(file_name);
    prefix.push(".");
    prefix
}

/// Persist the directory entry created by a rename. Not every platform can
/// open a directory for syncing, so failures are only logged.
fn sync_directory(dir: &Path) {
    let result = File::open(dir).and_then(|d| d.sync_all());
    if let Err(e) = result {
        debug!(dir = %dir.display(), error = %e, "directory sync skipped");
    }
}

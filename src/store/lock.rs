//! Backing file lock
//!
//! An exclusive advisory lock on a sidecar `.lock` file. The lock is taken on
//! a dedicated handle, so a second open of the same collection conflicts even
//! inside one process, and it survives compaction swapping the data file.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use super::with_suffix;
use crate::error::{Result, ZelosError};

/// Path of the lock guarding `data_path`
pub fn lock_path(data_path: &Path) -> PathBuf {
    with_suffix(data_path, ".lock")
}

/// Held for as long as a collection has its backing file open
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    file: File,
}

impl FileLock {
    /// Lock the backing file at `data_path`
    ///
    /// Fails with `FileLocked` if another holder has it.
    pub fn acquire(data_path: &Path) -> Result<Self> {
        let path = lock_path(data_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { path, file }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(ZelosError::FileLocked(data_path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Closing the handle releases the lock as well
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::debug!(path = %self.path.display(), "Failed to unlock: {}", e);
        }
    }
}

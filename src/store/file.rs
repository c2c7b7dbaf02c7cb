//! File Store
//!
//! Owns the backing file of one collection. Appends are positional writes at
//! the tracked end-of-file; reads are positional too, so readers never move a
//! shared cursor and can run alongside the single writer.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::config::SyncStrategy;
use crate::error::{Result, ZelosError};

/// Append-only backing file
///
/// ## Concurrency:
/// - `file`: RwLock so appends and reads share it; only `replace`/`close`
///   take it exclusively
/// - `len`: end of the last fully written record; a record becomes readable
///   only after `len` moves past it
/// - Callers serialize `append` (the collection write section)
pub struct FileStore {
    path: PathBuf,

    /// None once closed
    file: RwLock<Option<File>>,

    len: AtomicU64,

    /// Bumped every time compaction swaps in a new file
    generation: AtomicU64,

    sync_strategy: SyncStrategy,

    /// Appends not yet fsynced (EveryNWrites only)
    unsynced: AtomicUsize,
}

impl FileStore {
    /// Open or create the backing file
    pub fn open(path: &Path, sync_strategy: SyncStrategy) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(Some(file)),
            len: AtomicU64::new(len),
            generation: AtomicU64::new(0),
            sync_strategy,
            unsynced: AtomicUsize::new(0),
        })
    }

    /// Append a record at end-of-file and return its starting offset
    ///
    /// Either the whole record lands (and is synced per the strategy) or the
    /// file is cut back to the previous end and the error is returned.
    pub fn append(&self, bytes: &[u8]) -> Result<u64> {
        let guard = self.file.read();
        let file = guard.as_ref().ok_or_else(|| self.closed())?;

        let offset = self.len.load(Ordering::Acquire);

        let written = write_all_at(file, bytes, offset).and_then(|_| self.sync_after_append(file));
        if let Err(e) = written {
            if let Err(rollback) = file.set_len(offset) {
                tracing::error!(
                    path = %self.path.display(),
                    offset,
                    "Failed to roll back partial append: {}",
                    rollback
                );
            }
            return Err(e.into());
        }

        self.len.store(offset + bytes.len() as u64, Ordering::Release);
        Ok(offset)
    }

    /// Read `length` bytes at `offset`
    pub fn read(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let guard = self.file.read();
        let file = guard.as_ref().ok_or_else(|| self.closed())?;

        let file_len = self.len.load(Ordering::Acquire);
        let in_range = offset
            .checked_add(length as u64)
            .map_or(false, |end| end <= file_len);
        if !in_range {
            tracing::error!(
                path = %self.path.display(),
                offset,
                length,
                file_len,
                "Read past end of backing file"
            );
            return Err(ZelosError::OffsetOutOfRange {
                offset,
                length: length as u64,
                file_len,
            });
        }

        let mut buf = vec![0u8; length];
        read_exact_at(file, &mut buf, offset)?;
        Ok(buf)
    }

    /// Force all appended bytes to durable storage
    pub fn sync(&self) -> Result<()> {
        let guard = self.file.read();
        let file = guard.as_ref().ok_or_else(|| self.closed())?;

        file.sync_data()?;
        self.unsynced.store(0, Ordering::Release);
        Ok(())
    }

    /// Cut the file to `len` bytes (recovery of a torn tail)
    pub fn truncate(&self, len: u64) -> Result<()> {
        let guard = self.file.read();
        let file = guard.as_ref().ok_or_else(|| self.closed())?;

        file.set_len(len)?;
        file.sync_all()?;
        self.len.store(len, Ordering::Release);
        Ok(())
    }

    /// Swap in a new backing file (compaction)
    ///
    /// The previous handle is dropped here.
    pub(crate) fn replace(&self, file: File, len: u64) {
        let mut guard = self.file.write();
        *guard = Some(file);
        self.len.store(len, Ordering::Release);
        self.unsynced.store(0, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Sync and release the file handle
    pub fn close(&self) -> Result<()> {
        let mut guard = self.file.write();
        if let Some(file) = guard.take() {
            file.sync_all()?;
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current file length in bytes
    pub fn len(&self) -> u64 {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.file.read().is_none()
    }

    /// Number of times the file has been replaced; offsets from an older
    /// generation are stale
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn sync_after_append(&self, file: &File) -> io::Result<()> {
        match self.sync_strategy {
            SyncStrategy::EveryWrite => file.sync_data(),
            SyncStrategy::EveryNWrites { count } => {
                let pending = self.unsynced.fetch_add(1, Ordering::AcqRel) + 1;
                if pending >= count {
                    file.sync_data()?;
                    self.unsynced.store(0, Ordering::Release);
                }
                Ok(())
            }
        }
    }

    fn closed(&self) -> ZelosError {
        ZelosError::Io(io::Error::new(
            io::ErrorKind::NotConnected,
            format!("file store {} is closed", self.path.display()),
        ))
    }
}

// =============================================================================
// Positional I/O
// =============================================================================

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                let rest = buf;
                buf = &mut rest[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

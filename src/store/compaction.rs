//! Compaction
//!
//! Rewrites the live records of a backing file into a fresh file and swaps it
//! in with an atomic rename. A crash at any point leaves either the old file
//! or the new one at the collection path, never a mix; a leftover `.compact`
//! file is discarded on the next open.
//!
//! ## Invariants
//! - Compaction does not change logical state
//! - Output holds exactly one data record per live key, in key order
//! - Every copied record is checksum-verified on the way through

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::{sync_parent_dir, with_suffix, FileStore};
use crate::codec::decode_record;
use crate::error::{Result, ZelosError};
use crate::index::IndexEntry;

/// Path of the compaction output for `data_path`
pub fn compaction_path(data_path: &Path) -> PathBuf {
    with_suffix(data_path, ".compact")
}

/// Result of a compaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionReport {
    /// Live records copied into the new file
    pub records_written: usize,

    /// Backing file size before compaction
    pub bytes_before: u64,

    /// Backing file size after compaction
    pub bytes_after: u64,
}

impl CompactionReport {
    pub fn bytes_reclaimed(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// A compacted copy of a backing file, written and synced but not yet
/// swapped in. Dropping it without `install` deletes the copy.
pub struct PreparedCompaction {
    tmp_path: PathBuf,
    file: Option<File>,
    entries: BTreeMap<String, IndexEntry>,
    report: CompactionReport,
}

impl PreparedCompaction {
    /// Copy every live record of `store` into a fresh file
    ///
    /// `live` must yield each live key once, in the order the output should
    /// have. The original file is only read.
    pub fn write<I>(store: &FileStore, live: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, IndexEntry)>,
    {
        let tmp_path = compaction_path(store.path());

        match Self::write_copy(store, live, &tmp_path) {
            Ok((file, entries, report)) => Ok(Self {
                tmp_path,
                file: Some(file),
                entries,
                report,
            }),
            Err(e) => {
                remove_quietly(&tmp_path);
                Err(e)
            }
        }
    }

    fn write_copy<I>(
        store: &FileStore,
        live: I,
        tmp_path: &Path,
    ) -> Result<(File, BTreeMap<String, IndexEntry>, CompactionReport)>
    where
        I: IntoIterator<Item = (String, IndexEntry)>,
    {
        let bytes_before = store.len();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(tmp_path)?;
        let mut writer = BufWriter::new(file);

        let mut entries = BTreeMap::new();
        let mut position: u64 = 0;

        for (key, entry) in live {
            let bytes = store.read(entry.offset, entry.length as usize)?;
            let record = decode_record(&bytes).map_err(|e| e.at_offset(entry.offset))?;

            if record.key != key || record.is_tombstone() {
                return Err(ZelosError::corrupt(
                    entry.offset,
                    format!(
                        "index entry for '{}' points at a record for '{}'",
                        key, record.key
                    ),
                ));
            }

            writer.write_all(&bytes)?;
            entries.insert(key, IndexEntry::live(position, entry.length, entry.sequence));
            position += entry.length as u64;
        }

        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        let report = CompactionReport {
            records_written: entries.len(),
            bytes_before,
            bytes_after: position,
        };

        Ok((file, entries, report))
    }

    /// Rename the copy over the backing file and hand it to `store`
    ///
    /// Returns the relocated index entries. Callers must hold every reader
    /// off while this runs so the index and file swap together.
    pub fn install(
        mut self,
        store: &FileStore,
    ) -> Result<(BTreeMap<String, IndexEntry>, CompactionReport)> {
        // On failure the copy is still owned here and Drop removes it
        fs::rename(&self.tmp_path, store.path())?;

        let file = self.file.take().ok_or_else(|| {
            ZelosError::Io(io::Error::new(
                io::ErrorKind::Other,
                "compaction output already consumed",
            ))
        })?;

        // The rename is done; the new file is the collection now
        if let Err(e) = sync_parent_dir(store.path()) {
            tracing::warn!(
                path = %store.path().display(),
                "Failed to sync directory after compaction: {}",
                e
            );
        }

        store.replace(file, self.report.bytes_after);

        let entries = std::mem::take(&mut self.entries);
        Ok((entries, self.report.clone()))
    }

    pub fn report(&self) -> &CompactionReport {
        &self.report
    }
}

impl Drop for PreparedCompaction {
    fn drop(&mut self) {
        // Not installed: throw the copy away
        if self.file.take().is_some() {
            remove_quietly(&self.tmp_path);
        }
    }
}

/// Delete a compaction output left behind by a crash
///
/// Returns whether one was found.
pub fn discard_stale(data_path: &Path) -> Result<bool> {
    let tmp_path = compaction_path(data_path);
    match fs::remove_file(&tmp_path) {
        Ok(()) => {
            tracing::warn!(path = %tmp_path.display(), "Removed stale compaction output");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), "Failed to remove compaction output: {}", e);
        }
    }
}

//! File Store Module
//!
//! Append-only persistence for one collection's backing file.
//!
//! ## Responsibilities
//! - Append records at end-of-file and sync them per the sync strategy
//! - Positional reads of immutable byte ranges (concurrent with appends)
//! - Replay scanning and torn-tail truncation on open
//! - Compaction into a fresh file swapped in by atomic rename
//! - Advisory lock so one backing file has one owner
//!
//! ## Directory Layout
//! ```text
//! {base_dir}/
//!   ├── {name}.zelos          records, appended in order
//!   ├── {name}.zelos.lock     advisory lock (fs2)
//!   └── {name}.zelos.compact  compaction output before rename
//! ```

mod compaction;
mod file;
mod lock;
mod recovery;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub use compaction::{compaction_path, discard_stale, CompactionReport, PreparedCompaction};
pub use file::FileStore;
pub use lock::{lock_path, FileLock};
pub use recovery::{DamagedRecord, RecordScanner, RecoveryReport, ScannedRecord, StoreRecovery};

/// Extension used for collection files
pub const FILE_EXTENSION: &str = "zelos";

/// `path` with `suffix` appended to its final component
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Sync the directory containing `path` so renames and creations are durable.
///
/// Windows has no directory fsync; NTFS journals the metadata update itself.
#[cfg(unix)]
pub(crate) fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::File::open(dir)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
pub(crate) fn sync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

//! Collection Module
//!
//! The unit of concurrency and consistency: one backing file, one index.
//!
//! ## Responsibilities
//! - Replay the backing file into the index on open
//! - Serialize writers; let readers run alongside them
//! - Keep the index in step with the file (append first, then index)
//! - Compact on demand or when dead bytes pile up
//!
//! ## Lifecycle
//! ```text
//!   ┌────────┐  open   ┌─────────┐  replay ok  ┌──────┐  close  ┌────────┐
//!   │ Closed │ ──────► │ Opening │ ──────────► │ Open │ ──────► │ Closed │
//!   └────────┘         └─────────┘             └──────┘         └────────┘
//! ```
//! Every operation outside `Open` fails with `CollectionClosed`.

mod cache;
mod compactor;
mod handle;
mod query;

pub use handle::Collection;
pub use query::Query;

pub(crate) use compactor::{Compactor, CompactorHandle};

/// Lifecycle state of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionState {
    /// Replaying the backing file into the index
    Opening,

    /// Serving reads and writes
    Open,

    /// File handle and lock released
    Closed,
}

/// Point-in-time statistics for a collection
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionStats {
    pub name: String,

    /// Live documents
    pub documents: usize,

    /// Deleted keys whose tombstones await compaction
    pub tombstones: usize,

    /// Bytes held by the current record of each live document
    pub live_bytes: u64,

    /// Size of the backing file
    pub file_bytes: u64,

    /// Share of the backing file that compaction would reclaim
    pub dead_ratio: f64,

    /// Highest sequence number assigned so far
    pub last_sequence: u64,

    /// Documents currently held by the read cache
    pub cached_documents: usize,

    /// Compactions installed since the collection was opened
    pub compactions: u64,
}

/// Fraction of `file_bytes` not covered by live records
pub(crate) fn dead_ratio(live_bytes: u64, file_bytes: u64) -> f64 {
    if file_bytes == 0 {
        return 0.0;
    }
    file_bytes.saturating_sub(live_bytes) as f64 / file_bytes as f64
}

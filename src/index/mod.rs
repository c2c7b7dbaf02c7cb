//! Index Module
//!
//! In-memory map from document key to record location.
//!
//! ## Responsibilities
//! - Resolve keys to (offset, length) in the backing file
//! - Rebuild deterministically by replaying records in offset order
//! - Hand out point-in-time snapshots for scans
//! - Track live bytes so the collection knows when to compact
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in RwLock:
//! - Ordered keys (scans and compaction output in key order)
//! - Many concurrent readers, one writer (the collection write section)
//! - Never persisted; the backing file is the source of truth

mod table;

pub use table::{IndexManager, IndexScan};

/// Location of the latest record for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Start of the record in the backing file
    pub offset: u64,

    /// Full record length, framing included
    pub length: u32,

    /// Sequence number of the record
    pub sequence: u64,

    /// The latest record for this key is a tombstone
    pub tombstone: bool,
}

impl IndexEntry {
    /// Entry for a data record
    pub fn live(offset: u64, length: u32, sequence: u64) -> Self {
        Self {
            offset,
            length,
            sequence,
            tombstone: false,
        }
    }

    /// Entry for a tombstone record
    pub fn tombstone(offset: u64, length: u32, sequence: u64) -> Self {
        Self {
            offset,
            length,
            sequence,
            tombstone: true,
        }
    }

    pub fn is_live(&self) -> bool {
        !self.tombstone
    }
}

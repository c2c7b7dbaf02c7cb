//! Index Manager implementation
//!
//! BTreeMap-based index with RwLock for concurrency.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::IndexEntry;
use crate::store::ScannedRecord;

/// Key → location map for one collection
///
/// Tombstone entries stay in the map until compaction so that the bytes they
/// occupy are still accounted for; `lookup` and `scan` only see live entries.
pub struct IndexManager {
    state: RwLock<IndexState>,
}

#[derive(Default)]
struct IndexState {
    entries: BTreeMap<String, IndexEntry>,
    live_count: usize,
    live_bytes: u64,
}

impl IndexState {
    /// Insert `entry`, keeping the live counters in step
    fn install(&mut self, key: String, entry: IndexEntry) -> Option<IndexEntry> {
        let previous = self.entries.insert(key, entry);

        if let Some(prev) = previous.filter(IndexEntry::is_live) {
            self.live_count -= 1;
            self.live_bytes -= prev.length as u64;
        }
        if entry.is_live() {
            self.live_count += 1;
            self.live_bytes += entry.length as u64;
        }

        previous
    }
}

impl IndexManager {
    /// Create an empty index
    pub fn new() -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Rebuild the index by replaying records in offset order
    ///
    /// Later records for a key override earlier ones; a tombstone takes the
    /// key out of the live set. Previous contents are discarded.
    pub fn rebuild<I>(&self, records: I)
    where
        I: IntoIterator<Item = ScannedRecord>,
    {
        let mut state = IndexState::default();

        for record in records {
            let entry = if record.is_tombstone() {
                IndexEntry::tombstone(record.offset, record.length, record.sequence)
            } else {
                IndexEntry::live(record.offset, record.length, record.sequence)
            };
            state.install(record.key, entry);
        }

        *self.state.write() = state;
    }

    /// Look up the live entry for a key
    pub fn lookup(&self, key: &str) -> Option<IndexEntry> {
        self.state
            .read()
            .entries
            .get(key)
            .copied()
            .filter(IndexEntry::is_live)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Install or overwrite the entry for a key
    ///
    /// Only call once the record at `entry` is fully written.
    /// Returns the previous live entry, if any.
    pub fn upsert(&self, key: String, entry: IndexEntry) -> Option<IndexEntry> {
        debug_assert!(entry.is_live());
        self.state
            .write()
            .install(key, entry)
            .filter(IndexEntry::is_live)
    }

    /// Record that `key` was deleted by the tombstone at `tombstone`
    ///
    /// Returns whether the key was live. An absent key is left untouched.
    pub fn remove(&self, key: &str, tombstone: IndexEntry) -> bool {
        debug_assert!(tombstone.tombstone);
        let mut state = self.state.write();

        match state.entries.get(key) {
            Some(entry) if entry.is_live() => {
                state.install(key.to_string(), tombstone);
                true
            }
            _ => false,
        }
    }

    /// Snapshot of all live entries in key order
    ///
    /// The snapshot reflects the index at the time of the call; later writes
    /// are not visible through it.
    pub fn scan(&self) -> IndexScan {
        let state = self.state.read();
        let snapshot: Vec<(String, IndexEntry)> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_live())
            .map(|(key, entry)| (key.clone(), *entry))
            .collect();

        IndexScan {
            inner: snapshot.into_iter(),
        }
    }

    /// Replace the whole index (after compaction relocated every record)
    pub fn replace(&self, entries: BTreeMap<String, IndexEntry>) {
        let mut state = IndexState::default();
        for (key, entry) in entries {
            state.install(key, entry);
        }
        *self.state.write() = state;
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.state.read().live_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes occupied by the records of live keys
    pub fn live_bytes(&self) -> u64 {
        self.state.read().live_bytes
    }

    /// Number of tombstone entries awaiting compaction
    pub fn tombstone_count(&self) -> usize {
        let state = self.state.read();
        state.entries.len() - state.live_count
    }
}

impl Default for IndexManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over an index snapshot
pub struct IndexScan {
    inner: std::vec::IntoIter<(String, IndexEntry)>,
}

impl Iterator for IndexScan {
    type Item = (String, IndexEntry);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for IndexScan {}

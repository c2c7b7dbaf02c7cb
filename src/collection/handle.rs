//! Collection implementation

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard};

use super::cache::DocumentCache;
use super::{dead_ratio, CollectionState, CollectionStats, CompactorHandle, Query};
use crate::codec::{decode_document, encode_document, encode_tombstone, validate_key, Document};
use crate::config::Config;
use crate::error::{Result, ZelosError};
use crate::index::{IndexEntry, IndexManager};
use crate::store::{
    discard_stale, CompactionReport, FileLock, FileStore, PreparedCompaction, StoreRecovery,
};

/// A named set of documents backed by one file
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader
///
/// - **Writes** (put/delete/compact): serialized by `write_lock`
///   - Acquired with the configured timeout; `Busy` before any effect
///   - Lock order: write_lock → state
///
/// - **Reads** (get/query/keys): never touch `write_lock`
///   - Shared `state` guard for the duration of one lookup + read
///   - Index snapshot, then positional read of immutable bytes
///
/// - **Compaction swap** and **close** take `state` exclusively, so no read
///   straddles the file replacement
pub struct Collection {
    name: String,

    config: Arc<Config>,

    /// Backing file (positional I/O, internal RwLock on the handle)
    store: FileStore,

    /// key → record location (internal RwLock)
    index: IndexManager,

    cache: DocumentCache,

    state: RwLock<CollectionState>,

    /// Serializes write operations (put/delete/compact)
    write_lock: Mutex<()>,

    /// Highest sequence number written so far
    last_sequence: AtomicU64,

    /// Advisory lock on the backing file, released on close
    file_lock: Mutex<Option<FileLock>>,

    compactor: Option<CompactorHandle>,

    /// Set while an automatic compaction is queued or running
    compaction_scheduled: AtomicBool,

    this: Weak<Collection>,
}

impl Collection {
    /// Open the collection stored at `path`, creating the file if needed
    ///
    /// Automatic compaction runs inline on the writing thread.
    pub fn open(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        config: Arc<Config>,
    ) -> Result<Arc<Self>> {
        Self::open_with(name.into(), path.as_ref(), config, None)
    }

    /// Open a collection
    ///
    /// On startup:
    /// 1. Take the advisory file lock (if enabled)
    /// 2. Remove compaction output left by a crash
    /// 3. Open/create the backing file
    /// 4. Replay it into the index (`Opening`)
    /// 5. Ready to serve requests (`Open`)
    pub(crate) fn open_with(
        name: String,
        path: &Path,
        config: Arc<Config>,
        compactor: Option<CompactorHandle>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let file_lock = if config.file_lock {
            Some(FileLock::acquire(path)?)
        } else {
            None
        };

        discard_stale(path)?;
        let store = FileStore::open(path, config.sync_strategy)?;

        let collection = Arc::new_cyclic(|this| Self {
            name,
            cache: DocumentCache::new(config.cache_capacity),
            config,
            store,
            index: IndexManager::new(),
            state: RwLock::new(CollectionState::Opening),
            write_lock: Mutex::new(()),
            last_sequence: AtomicU64::new(0),
            file_lock: Mutex::new(file_lock),
            compactor,
            compaction_scheduled: AtomicBool::new(false),
            this: this.clone(),
        });

        collection.replay()?;
        Ok(collection)
    }

    /// Rebuild the index from the backing file and move to `Open`
    fn replay(&self) -> Result<()> {
        let (records, report) = StoreRecovery::recover(&self.store)?;

        self.index.rebuild(records);
        self.last_sequence.store(report.last_sequence, Ordering::Release);
        *self.state.write() = CollectionState::Open;

        tracing::info!(
            collection = %self.name,
            path = %self.store.path().display(),
            records = report.records_recovered,
            documents = self.index.len(),
            last_sequence = report.last_sequence,
            truncated = report.was_truncated,
            "Collection opened"
        );
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get the document stored under `key`
    pub fn get(&self, key: &str) -> Result<Document> {
        let _state = self.read_state()?;

        if let Some(document) = self.cache.get(key) {
            return Ok(document);
        }

        let entry = self.index.lookup(key).ok_or_else(|| ZelosError::NotFound {
            key: key.to_string(),
        })?;
        let document = self.load(key, entry)?;

        self.cache.admit(document.clone(), |doc| {
            self.index
                .lookup(&doc.key)
                .map_or(false, |current| current.sequence == doc.version)
        });

        Ok(document)
    }

    /// Lazily iterate over the documents matching `predicate`, in key order
    ///
    /// The key set is fixed when this is called; each key yields its current
    /// version when reached and is skipped if it has been deleted by then.
    pub fn query<F>(&self, predicate: F) -> Result<Query<'_, F>>
    where
        F: FnMut(&Document) -> bool,
    {
        let _state = self.read_state()?;
        Ok(Query::new(self, self.index.scan(), predicate))
    }

    /// All live keys in order
    pub fn keys(&self) -> Result<Vec<String>> {
        let _state = self.read_state()?;
        Ok(self.index.scan().map(|(key, _)| key).collect())
    }

    pub fn contains_key(&self, key: &str) -> Result<bool> {
        let _state = self.read_state()?;
        Ok(self.index.contains_key(key))
    }

    /// Number of live documents
    pub fn len(&self) -> Result<usize> {
        let _state = self.read_state()?;
        Ok(self.index.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn stats(&self) -> Result<CollectionStats> {
        let _state = self.read_state()?;

        let live_bytes = self.index.live_bytes();
        let file_bytes = self.store.len();

        Ok(CollectionStats {
            name: self.name.clone(),
            documents: self.index.len(),
            tombstones: self.index.tombstone_count(),
            live_bytes,
            file_bytes,
            dead_ratio: dead_ratio(live_bytes, file_bytes),
            last_sequence: self.last_sequence.load(Ordering::Acquire),
            cached_documents: self.cache.len(),
            compactions: self.store.generation(),
        })
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store `document`, replacing any previous version. Returns its new version.
    pub fn put(&self, document: Document) -> Result<u64> {
        self.put_within(document, self.config.write_timeout)
    }

    /// `put`, waiting at most `timeout` for the write section
    pub fn put_within(&self, mut document: Document, timeout: Option<Duration>) -> Result<u64> {
        validate_key(&document.key)?;

        let write = self.lock_writes(timeout)?;
        let state = self.read_state()?;

        let sequence = self.last_sequence.load(Ordering::Acquire) + 1;
        let bytes = encode_document(&document, sequence)?;
        let offset = self.store.append(&bytes)?;
        self.last_sequence.store(sequence, Ordering::Release);

        // The record is fully written; only now may readers find it
        self.index.upsert(
            document.key.clone(),
            IndexEntry::live(offset, bytes.len() as u32, sequence),
        );

        tracing::debug!(
            collection = %self.name,
            key = %document.key,
            sequence,
            offset,
            "Stored document"
        );

        document.version = sequence;
        self.cache.insert(document);

        drop(state);
        drop(write);

        self.maybe_compact();
        Ok(sequence)
    }

    /// Delete the document under `key`. Returns whether it existed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        self.delete_within(key, self.config.write_timeout)
    }

    /// `delete`, waiting at most `timeout` for the write section
    pub fn delete_within(&self, key: &str, timeout: Option<Duration>) -> Result<bool> {
        let write = self.lock_writes(timeout)?;
        let state = self.read_state()?;

        if !self.index.contains_key(key) {
            return Ok(false);
        }

        let sequence = self.last_sequence.load(Ordering::Acquire) + 1;
        let bytes = encode_tombstone(key, sequence)?;
        let offset = self.store.append(&bytes)?;
        self.last_sequence.store(sequence, Ordering::Release);

        self.index.remove(
            key,
            IndexEntry::tombstone(offset, bytes.len() as u32, sequence),
        );
        self.cache.remove(key);

        tracing::debug!(
            collection = %self.name,
            key,
            sequence,
            offset,
            "Deleted document"
        );

        drop(state);
        drop(write);

        self.maybe_compact();
        Ok(true)
    }

    /// Force all writes so far to durable storage
    pub fn flush(&self) -> Result<()> {
        let _state = self.read_state()?;
        self.store.sync()?;
        tracing::debug!(collection = %self.name, "Flushed collection");
        Ok(())
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    /// Rewrite the backing file with only the live records
    pub fn compact(&self) -> Result<CompactionReport> {
        self.compact_within(self.config.write_timeout)
    }

    /// `compact`, waiting at most `timeout` for the write section
    pub fn compact_within(&self, timeout: Option<Duration>) -> Result<CompactionReport> {
        let _write = self.lock_writes(timeout)?;
        self.compact_locked()
    }

    /// Caller holds `write_lock`
    fn compact_locked(&self) -> Result<CompactionReport> {
        // Readers keep using the old file while the copy is written
        let prepared = {
            let _state = self.read_state()?;
            PreparedCompaction::write(&self.store, self.index.scan())?
        };

        let state = self.state.write();
        if *state != CollectionState::Open {
            return Err(self.closed());
        }

        let (entries, report) = prepared.install(&self.store)?;
        self.index.replace(entries);
        self.cache.clear();
        drop(state);

        tracing::info!(
            collection = %self.name,
            records = report.records_written,
            bytes_before = report.bytes_before,
            bytes_after = report.bytes_after,
            "Compacted collection"
        );
        Ok(report)
    }

    fn needs_compaction(&self) -> bool {
        let file_bytes = self.store.len();
        file_bytes >= self.config.compaction_min_bytes
            && dead_ratio(self.index.live_bytes(), file_bytes) > self.config.compaction_dead_ratio
    }

    /// Start automatic compaction if the threshold is crossed and none is pending
    fn maybe_compact(&self) {
        if !self.needs_compaction() || self.compaction_scheduled.swap(true, Ordering::AcqRel) {
            return;
        }

        if self.config.background_compaction {
            if let Some(compactor) = &self.compactor {
                if compactor.schedule(self.this.clone()) {
                    return;
                }
                tracing::warn!(
                    collection = %self.name,
                    "Background compactor unavailable, compacting inline"
                );
            }
        }

        self.run_scheduled_compaction();
    }

    /// Run a scheduled compaction, then pick up any trigger skipped meanwhile
    pub(crate) fn run_scheduled_compaction(&self) {
        loop {
            let compacted = self.compact_with_retries();
            self.compaction_scheduled.store(false, Ordering::Release);

            if !compacted
                || !self.needs_compaction()
                || self.compaction_scheduled.swap(true, Ordering::AcqRel)
            {
                break;
            }
        }
    }

    /// Automatic compaction with bounded retries; failures are logged only.
    /// Returns whether a compaction completed.
    fn compact_with_retries(&self) -> bool {
        let attempts = self.config.compaction_attempts.max(1);

        for attempt in 1..=attempts {
            let result = {
                let _write = self.write_lock.lock();
                if !self.needs_compaction() {
                    return false;
                }
                self.compact_locked()
            };

            match result {
                Ok(_) => return true,
                Err(ZelosError::CollectionClosed(_)) => return false,
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        collection = %self.name,
                        attempt,
                        "Automatic compaction failed, retrying: {}",
                        e
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        collection = %self.name,
                        attempts,
                        "Automatic compaction failed, giving up until the next trigger: {}",
                        e
                    );
                }
            }
        }

        false
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Flush, release the file handle and lock, and move to `Closed`
    ///
    /// Waits for an in-flight write. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let _write = self.write_lock.lock();
        let mut state = self.state.write();

        if *state == CollectionState::Closed {
            return Ok(());
        }
        *state = CollectionState::Closed;

        let result = self.store.close();
        self.cache.clear();
        self.file_lock.lock().take();

        tracing::info!(collection = %self.name, "Collection closed");
        result
    }

    pub fn state(&self) -> CollectionState {
        *self.state.read()
    }

    pub fn is_open(&self) -> bool {
        self.state() == CollectionState::Open
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Shared state guard, provided the collection is open
    fn read_state(&self) -> Result<RwLockReadGuard<'_, CollectionState>> {
        let state = self.state.read();
        if *state != CollectionState::Open {
            return Err(self.closed());
        }
        Ok(state)
    }

    fn lock_writes(&self, timeout: Option<Duration>) -> Result<MutexGuard<'_, ()>> {
        match timeout {
            None => Ok(self.write_lock.lock()),
            Some(timeout) => self.write_lock.try_lock_for(timeout).ok_or_else(|| {
                tracing::debug!(
                    collection = %self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Write section busy"
                );
                ZelosError::Busy(self.name.clone())
            }),
        }
    }

    /// Read and decode the record at `entry`, checking it belongs to `key`
    fn load(&self, key: &str, entry: IndexEntry) -> Result<Document> {
        let bytes = self.store.read(entry.offset, entry.length as usize)?;
        let document = decode_document(&bytes).map_err(|e| e.at_offset(entry.offset))?;

        if document.key != key {
            tracing::error!(
                collection = %self.name,
                key,
                offset = entry.offset,
                found = %document.key,
                "Index entry points at another key's record"
            );
            return Err(ZelosError::corrupt(
                entry.offset,
                format!("expected key '{}', found '{}'", key, document.key),
            ));
        }

        Ok(document)
    }

    /// One step of a query: the current version of `key`, if it still exists
    pub(super) fn read_current(&self, key: &str) -> Result<Option<Document>> {
        let _state = self.read_state()?;

        match self.index.lookup(key) {
            Some(entry) => self.load(key, entry).map(Some),
            None => Ok(None),
        }
    }

    fn closed(&self) -> ZelosError {
        ZelosError::CollectionClosed(self.name.clone())
    }
}

impl Drop for Collection {
    fn drop(&mut self) {
        if *self.state.get_mut() == CollectionState::Open {
            if let Err(e) = self.store.close() {
                tracing::warn!(collection = %self.name, "Failed to sync on drop: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("path", &self.store.path())
            .field("state", &self.state())
            .finish()
    }
}

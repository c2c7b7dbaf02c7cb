//! Document cache
//!
//! Bounded map of recently read or written documents, evicted in insertion
//! order. Writers update it after the index; readers may only admit a document
//! that is still the current version, checked under the cache mutex so a
//! concurrent write always lands after (and over) the admission.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::codec::Document;

pub(crate) struct DocumentCache {
    /// 0 disables the cache
    capacity: usize,
    inner: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    /// key → (insertion stamp, document)
    entries: HashMap<String, (u64, Document)>,

    /// Insertion order; stale stamps are skipped on eviction
    order: VecDeque<(String, u64)>,

    next_stamp: u64,
}

impl CacheState {
    fn insert(&mut self, document: Document, capacity: usize) {
        if let Some((_, cached)) = self.entries.get_mut(&document.key) {
            *cached = document;
            return;
        }

        let stamp = self.next_stamp;
        self.next_stamp += 1;
        self.order.push_back((document.key.clone(), stamp));
        self.entries.insert(document.key.clone(), (stamp, document));

        while self.entries.len() > capacity {
            let Some((key, stamp)) = self.order.pop_front() else {
                break;
            };
            if self.entries.get(&key).map_or(false, |(s, _)| *s == stamp) {
                self.entries.remove(&key);
            }
        }

        // Removals leave their keys behind in `order`
        if self.order.len() > capacity.saturating_mul(2) {
            let entries = &self.entries;
            self.order
                .retain(|(key, stamp)| entries.get(key).map_or(false, |(s, _)| s == stamp));
        }
    }
}

impl DocumentCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheState::default()),
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<Document> {
        if self.capacity == 0 {
            return None;
        }
        self.inner.lock().entries.get(key).map(|(_, doc)| doc.clone())
    }

    /// Write-through from the write section
    pub(crate) fn insert(&self, document: Document) {
        if self.capacity == 0 {
            return;
        }
        self.inner.lock().insert(document, self.capacity);
    }

    /// Cache a document read from disk if `is_current` still holds for it
    pub(crate) fn admit<F>(&self, document: Document, is_current: F)
    where
        F: FnOnce(&Document) -> bool,
    {
        if self.capacity == 0 {
            return;
        }

        let mut state = self.inner.lock();
        if is_current(&document) {
            state.insert(document, self.capacity);
        }
    }

    pub(crate) fn remove(&self, key: &str) {
        if self.capacity == 0 {
            return;
        }
        self.inner.lock().entries.remove(key);
    }

    pub(crate) fn clear(&self) {
        let mut state = self.inner.lock();
        state.entries.clear();
        state.order.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

//! Lazy query iterator
//!
//! Walks the keys of an index snapshot and reads one document per step. No
//! lock is held between steps, so writers and compaction proceed while a
//! query is open.

use super::Collection;
use crate::codec::Document;
use crate::error::{Result, ZelosError};
use crate::index::IndexScan;

/// Documents matching a predicate, in key order
///
/// A failed read yields an `Err` item and the iterator moves on to the next
/// key.
pub struct Query<'a, F> {
    collection: &'a Collection,
    entries: IndexScan,
    predicate: F,
    done: bool,
}

impl<'a, F> Query<'a, F>
where
    F: FnMut(&Document) -> bool,
{
    pub(crate) fn new(
        collection: &'a Collection,
        entries: IndexScan,
        predicate: F,
    ) -> Self {
        Self {
            collection,
            entries,
            predicate,
            done: false,
        }
    }
}

impl<F> Iterator for Query<'_, F>
where
    F: FnMut(&Document) -> bool,
{
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        for (key, _) in self.entries.by_ref() {
            match self.collection.read_current(&key) {
                Ok(Some(document)) => {
                    if (self.predicate)(&document) {
                        return Some(Ok(document));
                    }
                }
                // Deleted since the query started
                Ok(None) => continue,
                Err(e) => {
                    if matches!(e, ZelosError::CollectionClosed(_)) {
                        self.done = true;
                    }
                    return Some(Err(e));
                }
            }
        }

        self.done = true;
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            (0, Some(0))
        } else {
            (0, Some(self.entries.len()))
        }
    }
}

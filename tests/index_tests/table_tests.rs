//! Index Manager Tests
//!
//! Tests verify:
//! - Rebuild semantics (last record wins, tombstones hide keys)
//! - Incremental upsert/remove
//! - Snapshot scans in key order
//! - Live byte accounting
//! - Concurrent readers during writes

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use zelos::codec::RecordKind;
use zelos::index::{IndexEntry, IndexManager};
use zelos::store::ScannedRecord;

// =============================================================================
// Helper Functions
// =============================================================================

fn data(offset: u64, length: u32, sequence: u64, key: &str) -> ScannedRecord {
    ScannedRecord {
        offset,
        length,
        kind: RecordKind::Data,
        sequence,
        key: key.to_string(),
    }
}

fn tombstone(offset: u64, length: u32, sequence: u64, key: &str) -> ScannedRecord {
    ScannedRecord {
        kind: RecordKind::Tombstone,
        ..data(offset, length, sequence, key)
    }
}

// =============================================================================
// Rebuild Tests
// =============================================================================

#[test]
fn test_new_index_is_empty() {
    let index = IndexManager::new();
    assert!(index.is_empty());
    assert_eq!(index.len(), 0);
    assert_eq!(index.live_bytes(), 0);
    assert_eq!(index.scan().count(), 0);
}

#[test]
fn test_rebuild_last_record_wins() {
    let index = IndexManager::new();
    index.rebuild(vec![
        data(0, 30, 1, "a"),
        data(30, 40, 2, "b"),
        data(70, 35, 3, "a"),
    ]);

    assert_eq!(index.len(), 2);
    assert_eq!(index.lookup("a"), Some(IndexEntry::live(70, 35, 3)));
    assert_eq!(index.lookup("b"), Some(IndexEntry::live(30, 40, 2)));
    assert_eq!(index.live_bytes(), 75);
}

#[test]
fn test_rebuild_tombstone_hides_key() {
    let index = IndexManager::new();
    index.rebuild(vec![
        data(0, 30, 1, "a"),
        tombstone(30, 20, 2, "a"),
        data(50, 30, 3, "b"),
    ]);

    assert_eq!(index.lookup("a"), None);
    assert!(!index.contains_key("a"));
    assert_eq!(index.len(), 1);
    assert_eq!(index.tombstone_count(), 1);
    assert_eq!(index.live_bytes(), 30);
}

#[test]
fn test_rebuild_put_after_delete_revives() {
    let index = IndexManager::new();
    index.rebuild(vec![
        data(0, 30, 1, "a"),
        tombstone(30, 20, 2, "a"),
        data(50, 31, 3, "a"),
    ]);

    assert_eq!(index.lookup("a"), Some(IndexEntry::live(50, 31, 3)));
    assert_eq!(index.tombstone_count(), 0);
}

#[test]
fn test_rebuild_discards_previous_contents() {
    let index = IndexManager::new();
    index.upsert("stale".to_string(), IndexEntry::live(0, 10, 1));

    index.rebuild(vec![data(0, 30, 1, "fresh")]);

    assert!(!index.contains_key("stale"));
    assert!(index.contains_key("fresh"));
    assert_eq!(index.len(), 1);
}

#[test]
fn test_rebuild_is_deterministic() {
    let records = vec![
        data(0, 30, 1, "x"),
        data(30, 30, 2, "y"),
        tombstone(60, 20, 3, "x"),
        data(80, 30, 4, "z"),
        data(110, 30, 5, "y"),
    ];

    let first = IndexManager::new();
    first.rebuild(records.clone());
    let second = IndexManager::new();
    second.rebuild(records);

    assert_eq!(first.scan().collect::<Vec<_>>(), second.scan().collect::<Vec<_>>());
}

// =============================================================================
// Incremental Update Tests
// =============================================================================

#[test]
fn test_upsert_returns_previous_live_entry() {
    let index = IndexManager::new();

    assert_eq!(index.upsert("a".to_string(), IndexEntry::live(0, 10, 1)), None);
    assert_eq!(
        index.upsert("a".to_string(), IndexEntry::live(10, 12, 2)),
        Some(IndexEntry::live(0, 10, 1))
    );
    assert_eq!(index.live_bytes(), 12);
    assert_eq!(index.len(), 1);
}

#[test]
fn test_remove_live_key() {
    let index = IndexManager::new();
    index.upsert("a".to_string(), IndexEntry::live(0, 10, 1));

    assert!(index.remove("a", IndexEntry::tombstone(10, 8, 2)));
    assert_eq!(index.lookup("a"), None);
    assert_eq!(index.len(), 0);
    assert_eq!(index.live_bytes(), 0);
    assert_eq!(index.tombstone_count(), 1);
}

#[test]
fn test_remove_absent_key_changes_nothing() {
    let index = IndexManager::new();
    index.upsert("a".to_string(), IndexEntry::live(0, 10, 1));

    assert!(!index.remove("missing", IndexEntry::tombstone(10, 8, 2)));
    assert!(index.remove("a", IndexEntry::tombstone(10, 8, 2)));
    assert!(!index.remove("a", IndexEntry::tombstone(18, 8, 3)));

    assert_eq!(index.tombstone_count(), 1);
}

#[test]
fn test_replace_swaps_everything() {
    let index = IndexManager::new();
    index.upsert("a".to_string(), IndexEntry::live(100, 10, 1));
    index.remove("a", IndexEntry::tombstone(110, 8, 2));
    index.upsert("b".to_string(), IndexEntry::live(118, 10, 3));

    let mut relocated = BTreeMap::new();
    relocated.insert("b".to_string(), IndexEntry::live(0, 10, 3));
    index.replace(relocated);

    assert_eq!(index.lookup("b"), Some(IndexEntry::live(0, 10, 3)));
    assert_eq!(index.tombstone_count(), 0);
    assert_eq!(index.live_bytes(), 10);
}

// =============================================================================
// Scan Tests
// =============================================================================

#[test]
fn test_scan_in_key_order_live_only() {
    let index = IndexManager::new();
    for (i, key) in ["delta", "alpha", "charlie", "bravo"].iter().enumerate() {
        index.upsert(key.to_string(), IndexEntry::live(i as u64 * 10, 10, i as u64 + 1));
    }
    index.remove("charlie", IndexEntry::tombstone(40, 8, 5));

    let keys: Vec<String> = index.scan().map(|(key, _)| key).collect();
    assert_eq!(keys, vec!["alpha", "bravo", "delta"]);
}

#[test]
fn test_scan_is_a_snapshot() {
    let index = IndexManager::new();
    index.upsert("a".to_string(), IndexEntry::live(0, 10, 1));
    index.upsert("b".to_string(), IndexEntry::live(10, 10, 2));

    let scan = index.scan();
    assert_eq!(scan.len(), 2);

    index.upsert("c".to_string(), IndexEntry::live(20, 10, 3));
    index.remove("a", IndexEntry::tombstone(30, 8, 4));

    let keys: Vec<String> = scan.map(|(key, _)| key).collect();
    assert_eq!(keys, vec!["a", "b"]);

    // A new scan sees the changes
    let keys: Vec<String> = index.scan().map(|(key, _)| key).collect();
    assert_eq!(keys, vec!["b", "c"]);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_lookups_during_writes() {
    let index = Arc::new(IndexManager::new());
    for i in 0..100u64 {
        index.upsert(format!("key{:03}", i), IndexEntry::live(i * 10, 10, i + 1));
    }

    let writer = {
        let index = Arc::clone(&index);
        thread::spawn(move || {
            for i in 100..1100u64 {
                index.upsert(format!("key{:03}", i % 100), IndexEntry::live(i * 10, 10, i + 1));
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for _ in 0..1000 {
                    for i in (0..100).step_by(7) {
                        assert!(index.lookup(&format!("key{:03}", i)).is_some());
                    }
                    assert_eq!(index.scan().len(), 100);
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(index.len(), 100);
    assert_eq!(index.live_bytes(), 1000);
}

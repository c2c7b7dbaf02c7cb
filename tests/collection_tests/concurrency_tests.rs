//! Collection Concurrency Tests
//!
//! Tests verify:
//! - Concurrent writers on distinct keys all land
//! - Readers never observe a partially written document
//! - Timed writes either take effect or fail with Busy, never half-way
//! - Queries run alongside writers and compaction

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use zelos::{Collection, Config, Container, Document, ZelosError};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup(builder: zelos::config::ConfigBuilder) -> (TempDir, Container, Arc<Collection>) {
    let temp_dir = TempDir::new().unwrap();
    let config = builder.base_dir(temp_dir.path()).build();
    let container = Container::open(config).unwrap();
    let collection = container.get_or_open_collection("concurrent").unwrap();
    (temp_dir, container, collection)
}

/// A document whose body can be checked against its key
fn signed(key: &str, round: u64) -> Document {
    Document::new(key, json!({ "owner": key, "round": round, "fill": "x".repeat(64) }))
}

fn assert_signed(doc: &Document) {
    assert_eq!(doc.value["owner"], doc.key.as_str());
    assert_eq!(doc.value["fill"].as_str().unwrap().len(), 64);
}

// =============================================================================
// Writer Tests
// =============================================================================

#[test]
fn test_concurrent_distinct_key_puts() {
    let (_temp, _container, collection) = setup(Config::builder().flush_on_write(false));
    let threads = 8;
    let per_thread = 50;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let collection = Arc::clone(&collection);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..per_thread {
                    collection.put(signed(&format!("t{}-{}", t, i), 0)).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(collection.len().unwrap(), threads * per_thread);
    for t in 0..threads {
        for i in 0..per_thread {
            assert_signed(&collection.get(&format!("t{}-{}", t, i)).unwrap());
        }
    }

    // Every write got its own sequence number
    assert_eq!(
        collection.stats().unwrap().last_sequence,
        (threads * per_thread) as u64
    );
}

#[test]
fn test_concurrent_writes_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder().base_dir(temp_dir.path()).build();

    {
        let container = Container::open(config.clone()).unwrap();
        let collection = container.get_or_open_collection("concurrent").unwrap();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let collection = Arc::clone(&collection);
                thread::spawn(move || {
                    for i in 0..25 {
                        collection.put(signed(&format!("k{}-{}", t, i), 1)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        container.close_all().unwrap();
    }

    let container = Container::open(config).unwrap();
    let collection = container.get_or_open_collection("concurrent").unwrap();
    assert_eq!(collection.len().unwrap(), 100);
}

#[test]
fn test_timed_writes_are_all_or_nothing() {
    let (_temp, _container, collection) = setup(Config::builder());
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let collection = Arc::clone(&collection);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut stored = Vec::new();
                for i in 0..20 {
                    let key = format!("t{}-{}", t, i);
                    match collection.put_within(signed(&key, 0), Some(Duration::ZERO)) {
                        Ok(_) => stored.push(key),
                        Err(e @ ZelosError::Busy(_)) => assert!(e.is_retryable()),
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
                stored
            })
        })
        .collect();

    let mut stored = Vec::new();
    for handle in handles {
        stored.extend(handle.join().unwrap());
    }

    // Busy writes left nothing behind
    assert_eq!(collection.len().unwrap(), stored.len());
    for key in stored {
        assert_signed(&collection.get(&key).unwrap());
    }
}

// =============================================================================
// Reader Tests
// =============================================================================

#[test]
fn test_readers_see_whole_documents_during_overwrites() {
    let (_temp, _container, collection) =
        setup(Config::builder().flush_on_write(false).cache_capacity(8));
    let keys: Vec<String> = (0..16).map(|i| format!("k{:02}", i)).collect();
    for key in &keys {
        collection.put(signed(key, 0)).unwrap();
    }

    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let collection = Arc::clone(&collection);
        let keys = keys.clone();
        thread::spawn(move || {
            for round in 1..=50u64 {
                for key in &keys {
                    collection.put(signed(key, round)).unwrap();
                }
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let collection = Arc::clone(&collection);
            let keys = keys.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut last_seen = vec![0u64; keys.len()];
                while !stop.load(Ordering::Acquire) {
                    for (i, key) in keys.iter().enumerate() {
                        let doc = collection.get(key).unwrap();
                        assert_signed(&doc);

                        // Versions never go backwards for a single reader
                        assert!(doc.version >= last_seen[i]);
                        last_seen[i] = doc.version;
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    stop.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }

    for key in &keys {
        assert_eq!(collection.get(key).unwrap().value["round"], 50);
    }
}

#[test]
fn test_queries_during_writes_and_compaction() {
    let (_temp, _container, collection) = setup(
        Config::builder()
            .flush_on_write(false)
            .compaction_min_bytes(0)
            .compaction_dead_ratio(0.6),
    );
    for i in 0..32 {
        collection.put(signed(&format!("k{:02}", i), 0)).unwrap();
    }

    let stop = Arc::new(AtomicBool::new(false));

    // Overwrites keep pushing the dead ratio over the threshold, so
    // compaction swaps the file repeatedly under the readers
    let writer = {
        let collection = Arc::clone(&collection);
        thread::spawn(move || {
            for round in 1..=20u64 {
                for i in 0..32 {
                    collection.put(signed(&format!("k{:02}", i), round)).unwrap();
                }
            }
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let collection = Arc::clone(&collection);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    let docs: Vec<Document> = collection
                        .query(|_| true)
                        .unwrap()
                        .map(|d| d.unwrap())
                        .collect();
                    assert_eq!(docs.len(), 32);
                    docs.iter().for_each(assert_signed);
                }
            })
        })
        .collect();

    writer.join().unwrap();
    stop.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }

    let stats = collection.stats().unwrap();
    assert_eq!(stats.documents, 32);
    assert!(stats.dead_ratio <= 0.6);
}

//! Tests for Dict
//!
//! These tests verify:
//! - Shard routing
//! - Get/set/remove through the owning shard
//! - The in-place same-length update invariant
//! - Stats aggregation
//! - Concurrent access across shards

use std::sync::Arc;
use std::thread;

use emberkv::dict::{Dict, NO_TTL};
use emberkv::EmberError;

// =============================================================================
// Helper Functions
// =============================================================================

fn key(i: usize) -> String {
    format!("key:{:05}", i)
}

// =============================================================================
// Routing Tests
// =============================================================================

#[test]
fn test_shard_index_is_stable_and_masked() {
    let dict = Dict::new(16).unwrap();

    for i in 0..1000 {
        let k = key(i);
        let shard = dict.shard_index(&k);
        assert!(shard < 16);
        assert_eq!(shard, dict.shard_index(&k));
    }
}

#[test]
fn test_keys_spread_over_shards() {
    let dict = Dict::new(8).unwrap();
    let mut used = [false; 8];

    for i in 0..1000 {
        used[dict.shard_index(&key(i))] = true;
    }

    assert!(used.iter().all(|&u| u));
}

#[test]
fn test_single_shard_dict() {
    let dict = Dict::new(1).unwrap();
    dict.set_tx("a", b"1", NO_TTL).unwrap();
    dict.set_tx("b", b"2", NO_TTL).unwrap();

    assert_eq!(dict.shard_index("a"), 0);
    assert_eq!(dict.len(), 2);
}

#[test]
fn test_shard_count_must_be_power_of_two() {
    assert!(matches!(Dict::new(0), Err(EmberError::Config(_))));
    assert!(matches!(Dict::new(3), Err(EmberError::Config(_))));
    assert!(Dict::new(1024).is_ok());
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_set_get_remove() {
    let dict = Dict::new(4).unwrap();

    assert!(dict.set_tx("hello", b"world", NO_TTL).unwrap());
    let (value, ttl) = dict.get("hello").unwrap();
    assert_eq!(&value[..], b"world");
    assert_eq!(ttl, NO_TTL);

    assert!(dict.remove("hello"));
    assert!(dict.get("hello").is_none());
    assert!(!dict.remove("hello"));
    assert!(dict.is_empty());
}

#[test]
fn test_expired_reads_as_missing_but_stays_indexed() {
    let dict = Dict::new(4).unwrap();
    dict.set_tx("gone", b"v", 1).unwrap();

    assert!(dict.get("gone").is_none());
    assert!(!dict.contains("gone"));
    assert_eq!(dict.len(), 1);
}

#[test]
fn test_explicit_clock_sees_entries_as_of_that_time() {
    let dict = Dict::new(4).unwrap();
    dict.set_tx("k", b"v", 50).unwrap();

    assert!(dict.get("k").is_none());
    assert!(!dict.contains_at("k", 100));
    assert!(dict.contains_at("k", 0));

    assert_eq!(dict.get_at("k", 0).unwrap().1, 50);
    assert!(dict.set_ttl_at("k", NO_TTL, 0));
    assert_eq!(&dict.get("k").unwrap().0[..], b"v");
}

#[test]
fn test_set_ttl_on_live_and_missing_keys() {
    let dict = Dict::new(4).unwrap();
    dict.set_tx("k", b"v", NO_TTL).unwrap();

    let far = i64::MAX;
    assert!(dict.set_ttl("k", far));
    assert_eq!(dict.get("k").unwrap().1, far);
    assert!(!dict.set_ttl("missing", far));
}

#[test]
fn test_with_value_avoids_copy() {
    let dict = Dict::new(4).unwrap();
    dict.set_tx("n", b"12345", NO_TTL).unwrap();

    let len = dict.with_value("n", |value, _| value.len());
    assert_eq!(len, Some(5));
    assert_eq!(dict.with_value("missing", |value, _| value.len()), None);
}

// =============================================================================
// In-place Update Tests
// =============================================================================

#[test]
fn test_same_length_updates_never_add_unused_bytes() {
    let dict = Dict::new(4).unwrap();
    let shard = dict.shard_index("counter");
    dict.set_tx("counter", b"0000", NO_TTL).unwrap();

    for i in 0..1000 {
        let value = format!("{:04}", i);
        dict.set_tx("counter", value.as_bytes(), NO_TTL).unwrap();
        assert_eq!(dict.shard_stats(shard).unused, 0);
    }

    assert_eq!(&dict.get("counter").unwrap().0[..], b"0999");
}

#[test]
fn test_length_change_adds_unused_bytes() {
    let dict = Dict::new(4).unwrap();
    let shard = dict.shard_index("k");

    dict.set_tx("k", b"short", NO_TTL).unwrap();
    dict.set_tx("k", b"much longer value", NO_TTL).unwrap();

    // 1 length byte + 5 value bytes of the old record.
    assert_eq!(dict.shard_stats(shard).unused, 6);
}

// =============================================================================
// Scan / Stats Tests
// =============================================================================

#[test]
fn test_scan_visits_live_entries_once() {
    let dict = Dict::new(8).unwrap();
    for i in 0..100 {
        dict.set_tx(&key(i), b"v", NO_TTL).unwrap();
    }
    dict.set_tx("expired", b"v", 1).unwrap();

    let mut seen = Vec::new();
    dict.scan(|k, _, _| {
        seen.push(k.to_string());
        true
    });
    seen.sort();

    let expected: Vec<String> = (0..100).map(key).collect();
    assert_eq!(seen, expected);
}

#[test]
fn test_scan_stops_early() {
    let dict = Dict::new(8).unwrap();
    for i in 0..100 {
        dict.set_tx(&key(i), b"v", NO_TTL).unwrap();
    }

    let mut visited = 0;
    dict.scan(|_, _, _| {
        visited += 1;
        visited < 10
    });

    assert_eq!(visited, 10);
}

#[test]
fn test_stats_aggregate_shards() {
    let dict = Dict::new(8).unwrap();
    for i in 0..50 {
        dict.set_tx(&key(i), b"abc", NO_TTL).unwrap();
    }
    for i in 0..10 {
        dict.remove(&key(i));
    }

    let stats = dict.stats();
    assert_eq!(stats.len, 40);
    assert_eq!(stats.alloc, 50 * 4);
    assert_eq!(stats.unused, 10 * 4);
    assert!((stats.unused_rate() - 20.0).abs() < 1e-9);
    assert_eq!(stats.eviction_rate(), 0.0);
}

#[test]
fn test_empty_stats_rates_are_zero() {
    let stats = Dict::new(2).unwrap().stats();
    assert_eq!(stats.unused_rate(), 0.0);
    assert_eq!(stats.eviction_rate(), 0.0);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writers_and_readers() {
    let dict = Arc::new(Dict::new(16).unwrap());
    let writers = 4;
    let per_writer = 500;

    let mut handles = Vec::new();
    for w in 0..writers {
        let dict = Arc::clone(&dict);
        handles.push(thread::spawn(move || {
            for i in 0..per_writer {
                let k = format!("w{}:{}", w, i);
                dict.set_tx(&k, k.as_bytes(), NO_TTL).unwrap();
            }
        }));
    }
    for _ in 0..2 {
        let dict = Arc::clone(&dict);
        handles.push(thread::spawn(move || {
            for i in 0..per_writer {
                let k = format!("w0:{}", i);
                if let Some((value, _)) = dict.get(&k) {
                    assert_eq!(&value[..], k.as_bytes());
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(dict.len(), writers * per_writer);
}

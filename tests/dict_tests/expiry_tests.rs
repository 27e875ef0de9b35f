//! Tests for expiration and compaction
//!
//! These tests verify:
//! - Active expiration ticks and the full GC pass
//! - Compaction keeps every live value and resets unused bytes
//! - Compaction is triggered by the migrate ratio

use emberkv::dict::{now_nanos, Dict, MAX_FAILED, NO_TTL};

// =============================================================================
// Helper Functions
// =============================================================================

/// Dict with one shard so every key lands in shard 0
fn single_shard() -> Dict {
    Dict::new(1).unwrap()
}

// =============================================================================
// Active Expiration Tests
// =============================================================================

#[test]
fn test_gc_evicts_every_expired_key() {
    let dict = Dict::new(8).unwrap();
    for i in 0..200 {
        let ttl = if i % 4 == 0 { 1 } else { NO_TTL };
        dict.set_tx(&format!("k{}", i), b"v", ttl).unwrap();
    }

    let evicted = dict.gc(0.99);

    assert_eq!(evicted, 50);
    assert_eq!(dict.len(), 150);
    assert_eq!(dict.stats().evictions, 50);
}

#[test]
fn test_tick_on_all_expired_shard_clears_it() {
    let dict = single_shard();
    for i in 0..100 {
        dict.set_tx(&format!("k{}", i), b"v", 1).unwrap();
    }

    // No live entries, so the walk never gives up.
    assert_eq!(dict.evict_expired(0, 17, 0.99), 100);
    assert!(dict.is_empty());
}

#[test]
fn test_tick_gives_up_on_live_shard() {
    let dict = single_shard();
    for i in 0..100 {
        dict.set_tx(&format!("k{}", i), b"v", NO_TTL).unwrap();
    }

    assert_eq!(dict.evict_expired(0, 0, 0.99), 0);
    assert_eq!(dict.stats().probes, (MAX_FAILED + 1) as u64);
}

#[test]
fn test_future_ttl_survives_gc() {
    let dict = single_shard();
    let later = now_nanos() + 60_000_000_000;
    dict.set_tx("later", b"v", later).unwrap();

    assert_eq!(dict.gc(0.99), 0);
    assert_eq!(dict.get("later").unwrap().1, later);
}

// =============================================================================
// Compaction Tests
// =============================================================================

#[test]
fn test_migrate_preserves_live_values() {
    let dict = single_shard();
    for i in 0..100 {
        dict.set_tx(&format!("k{}", i), format!("v{}", i).as_bytes(), NO_TTL)
            .unwrap();
    }
    for i in 0..100 {
        if i % 3 == 0 {
            dict.remove(&format!("k{}", i));
        } else if i % 3 == 1 {
            dict.set_tx(&format!("k{}", i), format!("value-{}", i).as_bytes(), NO_TTL)
                .unwrap();
        }
    }
    dict.set_tx("dead", b"x", 1).unwrap();

    let before: Vec<_> = (0..100)
        .map(|i| dict.get(&format!("k{}", i)))
        .collect();
    assert!(dict.shard_stats(0).unused > 0);

    dict.migrate(0);

    let stats = dict.shard_stats(0);
    assert_eq!(stats.unused, 0);
    assert_eq!(stats.migrations, 1);
    assert!(dict.get("dead").is_none());
    for (i, value) in before.into_iter().enumerate() {
        assert_eq!(dict.get(&format!("k{}", i)), value);
    }
}

#[test]
fn test_tick_compacts_over_ratio() {
    let dict = single_shard();
    for i in 0..10 {
        dict.set_tx(&format!("k{}", i), b"0123456789", NO_TTL).unwrap();
    }
    for i in 0..5 {
        dict.remove(&format!("k{}", i));
    }
    assert_eq!(dict.shard_stats(0).unused, 55);

    // Half the arena is dead, over a 0.4 ratio.
    dict.evict_expired(0, 0, 0.4);

    let stats = dict.shard_stats(0);
    assert_eq!(stats.migrations, 1);
    assert_eq!(stats.unused, 0);
    assert_eq!(stats.alloc, 55);
}

#[test]
fn test_tick_leaves_shard_under_ratio() {
    let dict = single_shard();
    for i in 0..10 {
        dict.set_tx(&format!("k{}", i), b"0123456789", NO_TTL).unwrap();
    }
    dict.remove("k0");

    dict.evict_expired(0, 0, 0.4);

    assert_eq!(dict.shard_stats(0).migrations, 0);
    assert_eq!(dict.shard_stats(0).unused, 11);
}

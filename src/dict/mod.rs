//! Dict Module
//!
//! Sharded in-memory dictionary with arena-backed values.
//!
//! ## Responsibilities
//! - Route each key to one shard (`hash(key) & mask`)
//! - Per-shard read/write locking, shards never contend with each other
//! - Lazy expiration on read, active expiration on demand
//! - Arena compaction ("migrate") once enough of a shard is dead bytes
//!
//! ## Layout
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                          Dict                            │
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐            │
//! │  │  Shard 0   │ │  Shard 1   │ │  Shard N   │            │
//! │  │  RwLock    │ │  RwLock    │ │  RwLock    │            │
//! │  │ ┌────────┐ │ │ ┌────────┐ │ │ ┌────────┐ │            │
//! │  │ │ index  │─┼─┼▶│ arena  │ │ │ │  ...   │ │            │
//! │  │ └────────┘ │ │ └────────┘ │ │ └────────┘ │            │
//! │  └────────────┘ └────────────┘ └────────────┘            │
//! └──────────────────────────────────────────────────────────┘
//!
//! arena record: [uvarint len][len bytes]
//! index entry:  key → Idx { start, expire_at }
//! ```

mod arena;
mod idx;
mod shard;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use bytes::Bytes;
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::{EmberError, Result};

pub use arena::Arena;
pub use idx::{now_nanos, Idx, NO_TTL};
pub use shard::{Shard, ShardStats};

/// Consecutive live probes after which an expiration walk gives up
pub const MAX_FAILED: usize = 3;

/// Aggregated dictionary statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Stats {
    /// Index entries across all shards
    pub len: usize,
    /// Arena bytes across all shards
    pub alloc: usize,
    /// Dead arena bytes awaiting compaction
    pub unused: usize,
    pub evictions: u64,
    pub probes: u64,
    pub migrations: u64,
}

impl Stats {
    /// Percentage of arena bytes that are dead
    pub fn unused_rate(&self) -> f64 {
        if self.alloc == 0 {
            return 0.0;
        }
        self.unused as f64 / self.alloc as f64 * 100.0
    }

    /// Percentage of probes that found an expired entry
    pub fn eviction_rate(&self) -> f64 {
        if self.probes == 0 {
            return 0.0;
        }
        self.evictions as f64 / self.probes as f64 * 100.0
    }
}

/// Fixed array of independently locked shards
pub struct Dict {
    mask: usize,
    shards: Box<[RwLock<Shard>]>,
}

impl Dict {
    /// Create a dictionary with `shard_count` shards (a power of two)
    pub fn new(shard_count: usize) -> Result<Self> {
        if !shard_count.is_power_of_two() {
            return Err(EmberError::Config(format!(
                "shard_count must be a non-zero power of two, got {}",
                shard_count
            )));
        }
        let shards = (0..shard_count)
            .map(|_| RwLock::new(Shard::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            mask: shard_count - 1,
            shards,
        })
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Index of the shard owning `key`
    #[inline]
    pub fn shard_index(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) & self.mask
    }

    #[inline]
    fn shard_for(&self, key: &str) -> &RwLock<Shard> {
        &self.shards[self.shard_index(key)]
    }

    // =========================================================================
    // Per-key Operations
    // =========================================================================

    /// Get a copy of a live value and its expiration
    pub fn get(&self, key: &str) -> Option<(Bytes, i64)> {
        self.get_at(key, now_nanos())
    }

    pub fn get_at(&self, key: &str, now: i64) -> Option<(Bytes, i64)> {
        self.with_value_at(key, now, |value, expire_at| {
            (Bytes::copy_from_slice(value), expire_at)
        })
    }

    /// Run `f` against a live value while its shard is read-locked
    pub fn with_value<R, F>(&self, key: &str, f: F) -> Option<R>
    where
        F: FnOnce(&[u8], i64) -> R,
    {
        self.with_value_at(key, now_nanos(), f)
    }

    pub fn with_value_at<R, F>(&self, key: &str, now: i64, f: F) -> Option<R>
    where
        F: FnOnce(&[u8], i64) -> R,
    {
        let shard = self.shard_for(key).read();
        shard
            .get(key, now)
            .map(|(value, expire_at)| f(value, expire_at))
    }

    /// Whether a live value exists for `key`
    pub fn contains(&self, key: &str) -> bool {
        self.contains_at(key, now_nanos())
    }

    pub fn contains_at(&self, key: &str, now: i64) -> bool {
        self.with_value_at(key, now, |_, _| ()).is_some()
    }

    /// Whether the owning shard can take a value of `value_len` bytes
    pub fn has_room_for(&self, key: &str, value_len: usize) -> bool {
        self.shard_for(key).read().has_room_for(key, value_len)
    }

    /// Set a value, returning true if the key is new
    pub fn set_tx(&self, key: &str, value: &[u8], expire_at: i64) -> Result<bool> {
        self.set_tx_at(key, value, expire_at, now_nanos())
    }

    pub fn set_tx_at(&self, key: &str, value: &[u8], expire_at: i64, now: i64) -> Result<bool> {
        self.shard_for(key)
            .write()
            .set_tx_at(key, value, expire_at, now)
    }

    /// Remove a key, returning true if a live value was removed
    pub fn remove(&self, key: &str) -> bool {
        self.remove_at(key, now_nanos())
    }

    pub fn remove_at(&self, key: &str, now: i64) -> bool {
        self.shard_for(key).write().remove(key, now)
    }

    /// Replace the expiration of a live key
    pub fn set_ttl(&self, key: &str, expire_at: i64) -> bool {
        self.set_ttl_at(key, expire_at, now_nanos())
    }

    pub fn set_ttl_at(&self, key: &str, expire_at: i64, now: i64) -> bool {
        self.shard_for(key).write().set_ttl(key, expire_at, now)
    }

    // =========================================================================
    // Whole-dictionary Operations
    // =========================================================================

    /// Visit every live entry, shard by shard, until `f` returns false
    ///
    /// Each shard is read-locked while it is visited; `f` must not write to
    /// the dictionary.
    pub fn scan<F>(&self, mut f: F)
    where
        F: FnMut(&str, &[u8], i64) -> bool,
    {
        let now = now_nanos();
        for shard in self.shards.iter() {
            if !shard.read().scan(now, &mut f) {
                return;
            }
        }
    }

    /// Number of index entries (expired-but-not-evicted included)
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }

    /// Aggregate counters across shards
    pub fn stats(&self) -> Stats {
        self.shards.iter().fold(Stats::default(), |mut acc, shard| {
            let s = shard.read().stats();
            acc.len += s.len;
            acc.alloc += s.alloc;
            acc.unused += s.unused;
            acc.evictions += s.evictions;
            acc.probes += s.probes;
            acc.migrations += s.migrations;
            acc
        })
    }

    /// Counters of one shard
    pub fn shard_stats(&self, shard: usize) -> ShardStats {
        self.shards[shard & self.mask].read().stats()
    }

    // =========================================================================
    // Expiration / Compaction
    // =========================================================================

    /// One active-expiration tick on a single shard
    ///
    /// Probes from `offset`, stops after `MAX_FAILED` consecutive live
    /// entries, then compacts the shard if its unused ratio reached
    /// `migrate_ratio`. Returns the number of evicted entries.
    pub fn evict_expired(&self, shard: usize, offset: usize, migrate_ratio: f64) -> usize {
        self.evict_shard(shard, MAX_FAILED, offset, migrate_ratio)
    }

    /// Full expiration pass over every shard, no early exit
    pub fn gc(&self, migrate_ratio: f64) -> usize {
        (0..self.shards.len())
            .map(|shard| self.evict_shard(shard, usize::MAX, 0, migrate_ratio))
            .sum()
    }

    /// Compact one shard unconditionally
    pub fn migrate(&self, shard: usize) {
        self.shards[shard & self.mask].write().migrate(now_nanos());
    }

    fn evict_shard(&self, shard: usize, max_failed: usize, offset: usize, migrate_ratio: f64) -> usize {
        let now = now_nanos();
        let mut guard = self.shards[shard & self.mask].write();
        let evicted = guard.evict_expired(now, max_failed, offset);
        if guard.needs_migrate(migrate_ratio) {
            guard.migrate(now);
        }
        evicted
    }
}

impl std::fmt::Debug for Dict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dict")
            .field("shards", &self.shards.len())
            .field("len", &self.len())
            .finish()
    }
}

//! Dictionary shard
//!
//! One partition of the keyspace: a key → `Idx` index over a single arena.
//! A shard has no lock of its own; `Dict` wraps each one in a `RwLock`.

use std::collections::HashMap;

use tracing::debug;

use crate::error::Result;

use super::arena::Arena;
use super::idx::{now_nanos, Idx};

/// Per-shard counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardStats {
    pub len: usize,
    pub alloc: usize,
    pub unused: usize,
    pub evictions: u64,
    pub probes: u64,
    pub migrations: u64,
}

/// A keyspace partition with its own index and arena
#[derive(Debug, Default)]
pub struct Shard {
    index: HashMap<String, Idx>,
    arena: Arena,
    /// Bytes of superseded or removed records still held by `arena`
    unused: usize,
    evictions: u64,
    probes: u64,
    migrations: u64,
}

impl Shard {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Look up a live value and its expiration
    ///
    /// Expired entries read as absent but are left in place.
    pub fn get(&self, key: &str, now: i64) -> Option<(&[u8], i64)> {
        let idx = self.index.get(key)?;
        if idx.expired(now) {
            return None;
        }
        let value = self.arena.get(idx.start())?;
        Some((value, idx.expire_at()))
    }

    /// Visit live entries until `f` returns false
    ///
    /// Returns false if the walk was stopped early.
    pub fn scan<F>(&self, now: i64, f: &mut F) -> bool
    where
        F: FnMut(&str, &[u8], i64) -> bool,
    {
        for (key, idx) in &self.index {
            if idx.expired(now) {
                continue;
            }
            if let Some(value) = self.arena.get(idx.start()) {
                if !f(key, value, idx.expire_at()) {
                    return false;
                }
            }
        }
        true
    }

    /// Whether a value of `value_len` bytes can be stored under `key`
    ///
    /// Counts a same-length overwrite as free and assumes a compaction
    /// reclaims only the bytes already marked unused.
    pub fn has_room_for(&self, key: &str, value_len: usize) -> bool {
        let size = Arena::record_size(value_len);
        if self.arena.has_room(size) {
            return true;
        }
        if let Some(idx) = self.index.get(key) {
            if self.arena.record_len(idx.start()) == Some(size) {
                return true;
            }
        }
        self.unused > 0 && self.arena.len() - self.unused + size <= Arena::max_len()
    }

    /// Number of index entries, expired ones included
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn unused_bytes(&self) -> usize {
        self.unused
    }

    pub fn arena_len(&self) -> usize {
        self.arena.len()
    }

    pub fn stats(&self) -> ShardStats {
        ShardStats {
            len: self.index.len(),
            alloc: self.arena.len(),
            unused: self.unused,
            evictions: self.evictions,
            probes: self.probes,
            migrations: self.migrations,
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Set a value, returning true if the key was not indexed before
    ///
    /// A value of the same length as the stored one is written over the old
    /// bytes; anything else appends a new record and marks the old one unused.
    pub fn set_tx(&mut self, key: &str, value: &[u8], expire_at: i64) -> Result<bool> {
        self.set_tx_at(key, value, expire_at, now_nanos())
    }

    /// `set_tx` with an explicit clock for the compaction it may trigger
    pub fn set_tx_at(&mut self, key: &str, value: &[u8], expire_at: i64, now: i64) -> Result<bool> {
        if let Some(idx) = self.index.get_mut(key) {
            if self.arena.overwrite(idx.start(), value) {
                *idx = idx.with_ttl(expire_at);
                return Ok(false);
            }
        }

        if !self.arena.has_room(Arena::record_size(value.len())) && self.unused > 0 {
            self.migrate(now);
        }
        let start = self.arena.append(value)?;

        match self.index.get_mut(key) {
            Some(idx) => {
                self.unused += self.arena.record_len(idx.start()).unwrap_or(0);
                *idx = Idx::new(start, expire_at);
                Ok(false)
            }
            None => {
                self.index.insert(key.to_owned(), Idx::new(start, expire_at));
                Ok(true)
            }
        }
    }

    /// Remove a key, returning true only if the removed value was live
    pub fn remove(&mut self, key: &str, now: i64) -> bool {
        match self.index.remove(key) {
            Some(idx) => {
                self.unused += self.arena.record_len(idx.start()).unwrap_or(0);
                !idx.expired(now)
            }
            None => false,
        }
    }

    /// Replace the expiration of a live key
    ///
    /// An expired key is dropped and reported as missing.
    pub fn set_ttl(&mut self, key: &str, expire_at: i64, now: i64) -> bool {
        match self.index.get(key).map(|idx| idx.expired(now)) {
            Some(false) => {
                if let Some(idx) = self.index.get_mut(key) {
                    *idx = idx.with_ttl(expire_at);
                }
                true
            }
            Some(true) => {
                self.remove(key, now);
                false
            }
            None => false,
        }
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Probe entries starting at `offset` and drop the expired ones
    ///
    /// The walk stops once more than `max_failed` live entries were seen in
    /// a row. Returns the number of entries evicted.
    pub fn evict_expired(&mut self, now: i64, max_failed: usize, offset: usize) -> usize {
        let len = self.index.len();
        if len == 0 {
            return 0;
        }
        let skip = offset % len;

        let mut expired = Vec::new();
        let mut failed = 0usize;
        for (key, idx) in self.index.iter().skip(skip).chain(self.index.iter().take(skip)) {
            self.probes += 1;
            if idx.expired(now) {
                expired.push(key.clone());
                failed = 0;
            } else {
                failed += 1;
                if failed > max_failed {
                    break;
                }
            }
        }

        for key in &expired {
            self.remove(key, now);
        }
        self.evictions += expired.len() as u64;
        expired.len()
    }

    /// Whether unused bytes reached `ratio` of the arena
    pub fn needs_migrate(&self, ratio: f64) -> bool {
        !self.arena.is_empty() && self.unused as f64 / self.arena.len() as f64 >= ratio
    }

    /// Compact the arena, copying only live records
    ///
    /// Expired entries are dropped from the index. Every `Idx` of this shard
    /// is reassigned.
    pub fn migrate(&mut self, now: i64) {
        let before = self.arena.len();
        let mut fresh = Arena::with_capacity(before.saturating_sub(self.unused));
        let old = &self.arena;

        self.index.retain(|_, idx| {
            if idx.expired(now) {
                return false;
            }
            match old.record(idx.start()).map(|record| fresh.append_record(record)) {
                Some(Ok(start)) => {
                    *idx = idx.with_start(start);
                    true
                }
                _ => false,
            }
        });

        self.arena = fresh;
        self.unused = 0;
        self.migrations += 1;
        debug_assert!(self.invariants_hold());

        debug!(
            before = before,
            after = self.arena.len(),
            keys = self.index.len(),
            "Shard arena compacted"
        );
    }

    /// Whether `unused <= arena length` and every index entry resolves
    pub fn invariants_hold(&self) -> bool {
        self.unused <= self.arena.len()
            && self
                .index
                .values()
                .all(|idx| self.arena.get(idx.start()).is_some())
    }
}

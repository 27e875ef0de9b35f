//! Value descriptors
//!
//! An `Idx` is the only handle to a value: where its record starts in the
//! shard's arena and when it expires. It is plain `Copy` data; updates
//! return a new `Idx` instead of mutating one in place.

use std::time::{SystemTime, UNIX_EPOCH};

/// Expiration sentinel for keys that never expire
pub const NO_TTL: i64 = 0;

/// Arena offset plus expiration timestamp (unix nanoseconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Idx {
    start: u32,
    expire_at: i64,
}

impl Idx {
    pub fn new(start: u32, expire_at: i64) -> Self {
        Self { start, expire_at }
    }

    /// Arena offset of the value record
    #[inline]
    pub fn start(self) -> u32 {
        self.start
    }

    /// Expiration timestamp, `NO_TTL` when permanent
    #[inline]
    pub fn expire_at(self) -> i64 {
        self.expire_at
    }

    #[inline]
    pub fn has_ttl(self) -> bool {
        self.expire_at != NO_TTL
    }

    /// True once `now` has passed a set expiration
    #[inline]
    pub fn expired(self, now: i64) -> bool {
        self.expire_at != NO_TTL && self.expire_at < now
    }

    #[must_use]
    pub fn with_ttl(self, expire_at: i64) -> Self {
        Self { expire_at, ..self }
    }

    #[must_use]
    pub fn with_start(self, start: u32) -> Self {
        Self { start, ..self }
    }
}

/// Current wall-clock time in unix nanoseconds
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

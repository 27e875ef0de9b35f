//! Store Module
//!
//! The embedded store that ties the dictionary and the operation log
//! together.
//!
//! ## Responsibilities
//! - Own the data directory (advisory `LOCK` file)
//! - Replay the log into an empty dictionary on open
//! - Log every mutation before applying it
//! - Rewrite the log as a snapshot on `shrink`
//! - Start and stop the background tasks
//!
//! ## Write Path
//! ```text
//!   set_tx(k, v, t)
//!        │
//!        ▼
//!   ┌──────────┐   encode   ┌──────────┐  append  ┌──────────┐
//!   │ wal lock │──────────▶│  record  │────────▶│   WAL    │
//!   └──────────┘            └──────────┘          └────┬─────┘
//!                                                      │ apply
//!                                                      ▼
//!                                  ┌──────────────────────────────┐
//!                                  │ Dict: shard[hash(k) & mask]  │
//!                                  └──────────────────────────────┘
//! ```

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::codec::{BufferPool, Operation};
use crate::config::Config;
use crate::dict::{now_nanos, Dict, Stats, NO_TTL};
use crate::error::{EmberError, Result};
use crate::object::Encoder;
use crate::scheduler::BackgroundTasks;
use crate::wal::{Wal, WalReader};

/// Name of the advisory lock file inside the data directory
pub const LOCK_FILE: &str = "LOCK";

/// Idle record buffers kept by a store
const POOL_CAPACITY: usize = 16;

/// Clock used while replaying: earlier than every valid expiration, so each
/// record applies against the same live keys it was logged against
const REPLAY_CLOCK: i64 = 0;

/// Longest decimal rendering of an `i64`
const MAX_INT_LEN: usize = 20;

/// What applying one operation produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Unit,
    Count(usize),
    Flag(bool),
    Int(i64),
}

impl Outcome {
    fn count(self) -> usize {
        match self {
            Outcome::Count(n) => n,
            _ => 0,
        }
    }

    fn flag(self) -> bool {
        matches!(self, Outcome::Flag(true))
    }

    fn int(self) -> Option<i64> {
        match self {
            Outcome::Int(value) => Some(value),
            _ => None,
        }
    }
}

/// State shared between the store handle and its background tasks
pub(crate) struct Inner {
    config: Config,
    dict: Dict,

    /// Single writer: held across encode → append → apply
    wal: Mutex<Wal>,

    pool: BufferPool,

    /// Held by shrink (try_lock) and close (lock)
    shrink_lock: Mutex<()>,

    closed: AtomicBool,

    /// True while the log is being replayed; records are applied only
    loading: AtomicBool,

    lock_file: File,
}

/// An open emberkv store
///
/// ## Concurrency Model
///
/// - **Reads** (`get`, `scan`, `len`): shared lock on one shard at a time
/// - **Writes**: serialized by the WAL mutex, then an exclusive lock on the
///   owning shard. Log order is apply order.
/// - **Shrink**: non-blocking try-lock; holds the WAL mutex for the whole
///   rewrite, so writes wait while reads continue
/// - **Close**: waits for a running shrink, stops the background tasks,
///   syncs the log
pub struct Store {
    inner: Arc<Inner>,
    tasks: Mutex<Option<BackgroundTasks>>,
}

impl Store {
    /// Open or create a store
    ///
    /// On startup:
    /// 1. Validate the config and lock the data directory
    /// 2. Attach to the newest log segment
    /// 3. Replay every record into an empty dictionary
    /// 4. Start the background tasks
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(config.data_dir.join(LOCK_FILE))?;
        fs2::FileExt::try_lock_exclusive(&lock_file).map_err(|_| EmberError::DatabaseInUse)?;

        let wal = Wal::open(&config.data_dir, config.sync_policy, config.segment_size)?;

        info!(
            dir = %config.data_dir.display(),
            shards = config.shard_count,
            sync_policy = ?config.sync_policy,
            "Opening store"
        );

        let inner = Arc::new(Inner {
            dict: Dict::new(config.shard_count)?,
            config,
            wal: Mutex::new(wal),
            pool: BufferPool::new(POOL_CAPACITY),
            shrink_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            loading: AtomicBool::new(false),
            lock_file,
        });

        inner.load()?;
        let tasks = BackgroundTasks::start(Arc::clone(&inner))?;

        Ok(Self {
            inner,
            tasks: Mutex::new(Some(tasks)),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Close the store
    ///
    /// Waits for a running shrink, stops the background tasks, syncs the
    /// log and releases the directory lock. A second call returns
    /// `DatabaseClosed`.
    pub fn close(&self) -> Result<()> {
        let _shrink = self.inner.shrink_lock.lock();
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Err(EmberError::DatabaseClosed);
        }

        let tasks = self.tasks.lock().take();
        if let Some(tasks) = tasks {
            tasks.stop();
        }

        let synced = self.inner.wal.lock().sync();
        if let Err(e) = fs2::FileExt::unlock(&self.inner.lock_file) {
            warn!(error = %e, "Failed to release directory lock");
        }
        synced?;

        info!(dir = %self.inner.config.data_dir.display(), "Store closed");
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a value and its expiration (`NO_TTL` when permanent)
    ///
    /// Missing and expired keys both report `KeyNotFound`.
    pub fn get(&self, key: &str) -> Result<(Bytes, i64)> {
        self.inner.ensure_open()?;
        self.inner.dict.get(key).ok_or(EmberError::KeyNotFound)
    }

    /// Read a typed value stored with `set_object`
    pub fn get_object<V: Encoder>(&self, key: &str) -> Result<V> {
        self.inner.ensure_open()?;
        self.inner
            .dict
            .with_value(key, |value, _| V::deserialize(value))
            .ok_or(EmberError::KeyNotFound)?
            .map_err(|_| EmberError::WrongType)
    }

    /// Visit every live entry until `f` returns false
    ///
    /// `f` runs under a shard read lock and must not call back into the
    /// store's write path.
    pub fn scan<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(&str, &[u8], i64) -> bool,
    {
        self.inner.ensure_open()?;
        self.inner.dict.scan(f);
        Ok(())
    }

    /// Number of indexed keys, including expired ones not evicted yet
    pub fn len(&self) -> usize {
        self.inner.dict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.dict.is_empty()
    }

    pub fn stats(&self) -> Stats {
        self.inner.dict.stats()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Set a permanent value
    pub fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.set_tx(key, value, NO_TTL)
    }

    /// Set a value that expires after `ttl`
    pub fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let ttl = i64::try_from(ttl.as_nanos()).unwrap_or(i64::MAX);
        self.set_tx(key, value, now_nanos().saturating_add(ttl))
    }

    /// Set a value with an absolute expiration in unix nanoseconds
    ///
    /// `expire_at == NO_TTL` stores a permanent value.
    pub fn set_tx(&self, key: &str, value: &[u8], expire_at: i64) -> Result<()> {
        check_timestamp(expire_at)?;
        let mut wal = self.inner.lock_wal()?;
        self.inner.write(
            &mut wal,
            &Operation::SetTx {
                key,
                value,
                expire_at,
            },
        )?;
        Ok(())
    }

    /// Store a typed value
    pub fn set_object<V: Encoder>(&self, key: &str, value: &V, expire_at: i64) -> Result<()> {
        let bytes = Encoder::serialize(value)?;
        self.set_tx(key, &bytes, expire_at)
    }

    /// Remove keys, returning how many live values were removed
    pub fn remove(&self, keys: &[&str]) -> Result<usize> {
        let mut wal = self.inner.lock_wal()?;
        let present: Vec<&str> = keys
            .iter()
            .copied()
            .filter(|key| self.inner.dict.contains(key))
            .collect();
        if present.is_empty() {
            return Ok(0);
        }

        let outcome = self.inner.write(&mut wal, &Operation::Remove { keys: present })?;
        Ok(outcome.count())
    }

    /// Replace the expiration of a live key
    ///
    /// Returns false, logging nothing, when the key is missing or expired.
    pub fn set_ttl(&self, key: &str, expire_at: i64) -> Result<bool> {
        check_timestamp(expire_at)?;
        let mut wal = self.inner.lock_wal()?;
        if !self.inner.dict.contains(key) {
            return Ok(false);
        }

        let outcome = self.inner.write(&mut wal, &Operation::SetTtl { key, expire_at })?;
        Ok(outcome.flag())
    }

    /// Make a live key permanent
    pub fn persist(&self, key: &str) -> Result<bool> {
        self.set_ttl(key, NO_TTL)
    }

    /// Add `delta` to a decimal integer value, returning the new value
    ///
    /// A missing key counts as 0. The key keeps its expiration.
    pub fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        let mut wal = self.inner.lock_wal()?;
        let (value, expire_at) = self.inner.incr_target(key, delta)?;

        if self.inner.dict.contains(key) {
            let outcome = self.inner.write(&mut wal, &Operation::Incr { key, delta })?;
            return outcome.int().ok_or(EmberError::NotAnInteger);
        }

        // Starting from 0 is logged as a plain set: replay may still index an
        // evicted or expired value under this key.
        let text = value.to_string();
        self.inner.write(
            &mut wal,
            &Operation::SetTx {
                key,
                value: text.as_bytes(),
                expire_at,
            },
        )?;
        Ok(value)
    }

    /// Move a value and its expiration from `from` to `to`
    ///
    /// Without `overwrite`, a live `to` is left alone and false is returned.
    pub fn rename(&self, from: &str, to: &str, overwrite: bool) -> Result<bool> {
        let mut wal = self.inner.lock_wal()?;
        if !self.inner.dict.contains(from) {
            return Err(EmberError::KeyNotFound);
        }
        if from == to {
            return Ok(overwrite);
        }
        if !overwrite && self.inner.dict.contains(to) {
            return Ok(false);
        }

        // Past this point `to` is either dead or meant to be replaced, so the
        // record always overwrites: replay may still index an evicted or
        // expired value there.
        let outcome = self.inner.write(
            &mut wal,
            &Operation::Rename {
                from,
                to,
                overwrite: true,
            },
        )?;
        Ok(outcome.flag())
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Rewrite the log as a snapshot of the live dictionary
    ///
    /// Returns `ShrinkAlreadyRunning` at once if another shrink holds the
    /// lock.
    pub fn shrink(&self) -> Result<()> {
        self.inner.shrink()
    }

    /// Evict every expired key now and compact shards over the ratio
    pub fn gc(&self) -> usize {
        self.inner.gc()
    }

    /// Number of segment files on disk
    pub fn segment_count(&self) -> Result<usize> {
        Ok(self.inner.wal.lock().segment_ids()?.len())
    }

    pub fn data_dir(&self) -> &Path {
        &self.inner.config.data_dir
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close store on drop");
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("data_dir", &self.inner.config.data_dir)
            .field("dict", &self.inner.dict)
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl Inner {
    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn shard_count(&self) -> usize {
        self.dict.shard_count()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EmberError::DatabaseClosed);
        }
        Ok(())
    }

    /// Current time for expiry checks on the write path
    fn clock(&self) -> i64 {
        if self.loading.load(Ordering::Acquire) {
            REPLAY_CLOCK
        } else {
            now_nanos()
        }
    }

    fn lock_wal(&self) -> Result<MutexGuard<'_, Wal>> {
        let wal = self.wal.lock();
        self.ensure_open()?;
        Ok(wal)
    }

    // =========================================================================
    // Log + Apply
    // =========================================================================

    /// Log `op` (unless replaying), then apply it
    fn write(&self, wal: &mut Wal, op: &Operation<'_>) -> Result<Outcome> {
        if !self.loading.load(Ordering::Acquire) {
            self.check_room(op)?;
            let mut encoder = self.pool.get();
            op.encode(&mut encoder);
            let logged = wal.write(encoder.as_bytes());
            self.pool.put(encoder);
            logged?;
        }
        self.apply(op)
    }

    /// Apply one operation to the dictionary
    ///
    /// Total over replayable input: preconditions are checked by the caller
    /// before logging, so a logged record never fails here.
    fn apply(&self, op: &Operation<'_>) -> Result<Outcome> {
        let now = self.clock();
        match *op {
            Operation::SetTx {
                key,
                value,
                expire_at,
            } => {
                self.dict.set_tx_at(key, value, expire_at, now)?;
                Ok(Outcome::Unit)
            }
            Operation::Remove { ref keys } => Ok(Outcome::Count(
                keys.iter().filter(|key| self.dict.remove_at(key, now)).count(),
            )),
            Operation::SetTtl { key, expire_at } => {
                Ok(Outcome::Flag(self.dict.set_ttl_at(key, expire_at, now)))
            }
            Operation::Incr { key, delta } => {
                let (value, expire_at) = self.incr_target(key, delta)?;
                self.dict
                    .set_tx_at(key, value.to_string().as_bytes(), expire_at, now)?;
                Ok(Outcome::Int(value))
            }
            Operation::Rename {
                from,
                to,
                overwrite,
            } => self.apply_rename(from, to, overwrite).map(Outcome::Flag),
        }
    }

    /// Reject a write the owning shard's arena cannot hold, before it is logged
    fn check_room(&self, op: &Operation<'_>) -> Result<()> {
        let (key, len) = match *op {
            Operation::SetTx { key, value, .. } => (key, value.len()),
            Operation::Incr { key, .. } => (key, MAX_INT_LEN),
            Operation::Rename { from, to, .. } => {
                match self.dict.with_value_at(from, self.clock(), |v, _| v.len()) {
                    Some(len) => (to, len),
                    None => return Ok(()),
                }
            }
            Operation::Remove { .. } | Operation::SetTtl { .. } => return Ok(()),
        };
        if self.dict.has_room_for(key, len) {
            Ok(())
        } else {
            Err(EmberError::ArenaFull)
        }
    }

    /// New value and kept expiration for an increment
    fn incr_target(&self, key: &str, delta: i64) -> Result<(i64, i64)> {
        let found = self
            .dict
            .with_value_at(key, self.clock(), |v, t| (parse_int(v), t));
        let (current, expire_at) = match found {
            Some((parsed, expire_at)) => (parsed?, expire_at),
            None => (0, NO_TTL),
        };
        let value = current.checked_add(delta).ok_or(EmberError::NotAnInteger)?;
        Ok((value, expire_at))
    }

    fn apply_rename(&self, from: &str, to: &str, overwrite: bool) -> Result<bool> {
        let now = self.clock();
        let Some((value, expire_at)) = self.dict.get_at(from, now) else {
            return Ok(false);
        };
        if from == to {
            return Ok(true);
        }
        if !overwrite && self.dict.contains_at(to, now) {
            return Ok(false);
        }
        self.dict.set_tx_at(to, &value, expire_at, now)?;
        self.dict.remove_at(from, now);
        Ok(true)
    }

    // =========================================================================
    // Replay
    // =========================================================================

    /// Rebuild the dictionary from the log
    fn load(&self) -> Result<()> {
        let started = Instant::now();
        let mut wal = self.wal.lock();
        let mut reader = wal.reader()?;

        self.loading.store(true, Ordering::Release);
        let result = self.replay(&mut wal, &mut reader);
        self.loading.store(false, Ordering::Release);

        match result {
            Ok(records) => {
                info!(
                    records,
                    segments = reader.segments_read(),
                    keys = self.dict.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Replay complete"
                );
                Ok(())
            }
            Err(e) if self.config.run_despite_load_error => {
                error!(
                    error = %e,
                    keys = self.dict.len(),
                    "Replay failed, continuing with partial state"
                );
                // Replace the damaged history with what was recovered.
                self.rewrite(&mut wal)
            }
            Err(e) => {
                error!(error = %e, "Replay failed");
                Err(e)
            }
        }
    }

    fn replay(&self, wal: &mut Wal, reader: &mut WalReader) -> Result<usize> {
        let mut applied = 0usize;
        for record in reader {
            let record = record?;
            let op = Operation::decode(&record).map_err(|e| match e {
                EmberError::UnsupportedValueType(tag) => EmberError::CorruptLogRecord(format!(
                    "record {}: unknown operation tag 0x{:02x}",
                    applied, tag
                )),
                EmberError::CorruptLogRecord(msg) => {
                    EmberError::CorruptLogRecord(format!("record {}: {}", applied, msg))
                }
                other => other,
            })?;
            self.write(wal, &op)?;
            applied += 1;
        }
        Ok(applied)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    pub(crate) fn shrink(&self) -> Result<()> {
        let Some(_guard) = self.shrink_lock.try_lock() else {
            debug!("Shrink rejected, already running");
            return Err(EmberError::ShrinkAlreadyRunning);
        };
        let mut wal = self.lock_wal()?;
        self.rewrite(&mut wal)
    }

    /// Write the live dictionary into fresh segments and drop older ones
    fn rewrite(&self, wal: &mut Wal) -> Result<()> {
        let started = Instant::now();
        let first = wal.open_new_segment()?;
        info!(segment = first, "Shrink started");

        let mut encoder = self.pool.get();
        let mut written = 0usize;
        let mut failure = None;
        self.dict.scan(|key, value, expire_at| {
            encoder.clear();
            Operation::SetTx {
                key,
                value,
                expire_at,
            }
            .encode(&mut encoder);
            match wal.append(encoder.as_bytes()) {
                Ok(()) => {
                    written += 1;
                    true
                }
                Err(e) => {
                    failure = Some(e);
                    false
                }
            }
        });
        self.pool.put(encoder);
        if let Some(e) = failure {
            warn!(error = %e, "Shrink failed while writing snapshot");
            return Err(e);
        }

        wal.sync()?;
        let removed = wal.remove_segments_before(first)?;

        info!(
            keys = written,
            segments_removed = removed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Shrink complete"
        );
        Ok(())
    }

    pub(crate) fn gc(&self) -> usize {
        let evicted = self.dict.gc(self.config.migrate_ratio);
        debug!(evicted, "GC pass complete");
        evicted
    }

    /// One active-expiration tick on `shard`
    pub(crate) fn evict_expired(&self, shard: usize, offset: usize) -> usize {
        self.dict
            .evict_expired(shard, offset, self.config.migrate_ratio)
    }

    pub(crate) fn sync_wal(&self) -> Result<()> {
        self.wal.lock().sync()
    }
}

fn check_timestamp(expire_at: i64) -> Result<()> {
    if expire_at < 0 {
        return Err(EmberError::InvalidTimestamp(expire_at));
    }
    Ok(())
}

fn parse_int(value: &[u8]) -> Result<i64> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(EmberError::NotAnInteger)
}

//! # emberkv
//!
//! An embedded, in-process key-value storage engine with:
//! - A sharded in-memory dictionary with per-shard locking
//! - Byte-arena value storage with in-place same-length updates
//! - Lazy and active TTL expiration, arena compaction
//! - A segmented, checksummed operation log with full replay on open
//! - Log rewrite ("shrink") that replaces history with a snapshot
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │            (single log writer / many readers)               │
//! └──────────────┬─────────────────────────────┬────────────────┘
//!                │ encode + append             │ apply
//!                ▼                             ▼
//!        ┌──────────────┐             ┌─────────────────┐
//!        │     WAL      │             │      Dict       │
//!        │  (segments)  │             │ shards (RwLock) │
//!        └──────┬───────┘             └────────┬────────┘
//!               │ replay on open               │
//!               └──────────────▶───────────────┘
//!                                              │
//!                              ┌───────────────┴───────────────┐
//!                              ▼                               ▼
//!                      ┌──────────────┐               ┌──────────────┐
//!                      │ index (Idx)  │──────────────▶│    arena     │
//!                      └──────────────┘               └──────────────┘
//!
//!   background: sync ticker ── maintenance ticker (expire, scheduled shrink)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use emberkv::{Config, Store, NO_TTL};
//!
//! let store = Store::open(Config::builder().data_dir("/tmp/ember").build())?;
//! store.set_tx("greeting", b"hello", NO_TTL)?;
//! let (value, _ttl) = store.get("greeting")?;
//! assert_eq!(&value[..], b"hello");
//! store.close()?;
//! # Ok::<(), emberkv::EmberError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod dict;
pub mod wal;
pub mod object;
pub mod store;

mod scheduler;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{EmberError, Result};
pub use config::{Config, ConfigBuilder, SyncPolicy};
pub use dict::{now_nanos, Stats, NO_TTL};
pub use object::{Bincode, Encoder};
pub use store::Store;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of emberkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

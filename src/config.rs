//! Configuration for emberkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{EmberError, Result};

/// Smallest accepted WAL segment size
const MIN_SEGMENT_SIZE: u64 = 4 * 1024;

/// Main configuration for an emberkv store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for the store
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── LOCK              (advisory lock, held while open)
    ///     ├── 000000001.seg     (operation log segments)
    ///     └── 000000002.seg
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Dictionary Configuration
    // -------------------------------------------------------------------------
    /// Number of shards (must be a power of two)
    pub shard_count: usize,

    /// Unused/total arena ratio at which a shard is compacted
    pub migrate_ratio: f64,

    /// Interval of the active expiration tick
    pub expire_interval: Duration,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync policy: how often to fsync the WAL
    pub sync_policy: SyncPolicy,

    /// Max size of one segment file before rotating (in bytes)
    pub segment_size: u64,

    /// Cron expression for scheduled shrinks, `None` disables them
    pub shrink_schedule: Option<String>,

    /// Keep opening the store when replay fails part-way
    pub run_despite_load_error: bool,
}

/// WAL sync policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Only fsync on shrink and close
    Never,

    /// fsync from a background ticker once per second
    EverySecond,

    /// fsync after every append (safest, slowest)
    Always,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./emberkv_data"),
            shard_count: 1024,
            migrate_ratio: 0.4,
            expire_interval: Duration::from_millis(100),
            sync_policy: SyncPolicy::EverySecond,
            segment_size: 256 * 1024 * 1024, // 256 MB
            shrink_schedule: None,
            run_despite_load_error: false,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check every option, returning the first violation
    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 || !self.shard_count.is_power_of_two() {
            return Err(EmberError::Config(format!(
                "shard_count must be a power of two, got {}",
                self.shard_count
            )));
        }

        if !(self.migrate_ratio > 0.0 && self.migrate_ratio <= 1.0) {
            return Err(EmberError::Config(format!(
                "migrate_ratio must be in (0, 1], got {}",
                self.migrate_ratio
            )));
        }

        if self.expire_interval.is_zero() {
            return Err(EmberError::Config(
                "expire_interval must be non-zero".to_string(),
            ));
        }

        if self.segment_size < MIN_SEGMENT_SIZE {
            return Err(EmberError::Config(format!(
                "segment_size must be at least {} bytes, got {}",
                MIN_SEGMENT_SIZE, self.segment_size
            )));
        }

        self.parsed_shrink_schedule()?;
        Ok(())
    }

    /// Parse the shrink schedule, if one is configured
    pub(crate) fn parsed_shrink_schedule(&self) -> Result<Option<cron::Schedule>> {
        match &self.shrink_schedule {
            None => Ok(None),
            Some(expr) => cron::Schedule::from_str(expr).map(Some).map_err(|e| {
                EmberError::Config(format!("invalid shrink schedule '{}': {}", expr, e))
            }),
        }
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the number of shards
    pub fn shard_count(mut self, count: usize) -> Self {
        self.config.shard_count = count;
        self
    }

    /// Set the compaction trigger ratio
    pub fn migrate_ratio(mut self, ratio: f64) -> Self {
        self.config.migrate_ratio = ratio;
        self
    }

    /// Set the active expiration interval
    pub fn expire_interval(mut self, interval: Duration) -> Self {
        self.config.expire_interval = interval;
        self
    }

    /// Set the WAL sync policy
    pub fn sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.config.sync_policy = policy;
        self
    }

    /// Set the segment size limit (in bytes)
    pub fn segment_size(mut self, size: u64) -> Self {
        self.config.segment_size = size;
        self
    }

    /// Set a cron expression for scheduled shrinks
    pub fn shrink_schedule(mut self, expr: impl Into<String>) -> Self {
        self.config.shrink_schedule = Some(expr.into());
        self
    }

    /// Open the store even if replay fails part-way
    pub fn run_despite_load_error(mut self, enabled: bool) -> Self {
        self.config.run_despite_load_error = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

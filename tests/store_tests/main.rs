//! Store integration tests

mod scenario_tests;

use std::path::Path;

use emberkv::{Config, Store, SyncPolicy};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

pub fn test_config(dir: &Path) -> Config {
    Config::builder()
        .data_dir(dir)
        .shard_count(16)
        .sync_policy(SyncPolicy::Never)
        .build()
}

pub fn setup_temp_store() -> (TempDir, Store) {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(test_config(temp_dir.path())).unwrap();
    (temp_dir, store)
}

pub fn reopen(dir: &Path) -> Store {
    Store::open(test_config(dir)).unwrap()
}

//! Background Tasks
//!
//! Two store-owned threads:
//!
//! - **sync**: fsyncs the log once per second (`SyncPolicy::EverySecond` only)
//! - **maintenance**: every `expire_interval`, runs one active-expiration
//!   tick on a random shard, then a shrink when the cron schedule is due
//!
//! Both stop when the shutdown channel disconnects; `stop` (or dropping the
//! handle) joins them, so no thread outlives the store.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam::channel::{self, select, Receiver, Sender};
use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::config::SyncPolicy;
use crate::error::{EmberError, Result};
use crate::store::Inner;

/// Interval of the `EverySecond` sync ticker
const SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Handles of the running background threads
pub(crate) struct BackgroundTasks {
    shutdown: Option<Sender<()>>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl BackgroundTasks {
    /// Spawn the tasks the store's config asks for
    pub(crate) fn start(inner: Arc<Inner>) -> Result<Self> {
        let (shutdown, shutdown_rx) = channel::bounded::<()>(0);
        let mut tasks = Self {
            shutdown: Some(shutdown),
            handles: Vec::with_capacity(2),
        };

        if inner.config().sync_policy == SyncPolicy::EverySecond {
            let inner = Arc::clone(&inner);
            let rx = shutdown_rx.clone();
            tasks.spawn("emberkv-sync", move || sync_loop(inner, rx))?;
        }

        let schedule = inner.config().parsed_shrink_schedule()?;
        tasks.spawn("emberkv-maintenance", move || {
            maintenance_loop(inner, schedule, shutdown_rx)
        })?;

        info!(tasks = tasks.handles.len(), "Background tasks started");
        Ok(tasks)
    }

    /// Signal shutdown and wait for every thread to exit
    pub(crate) fn stop(mut self) {
        self.shutdown();
    }

    fn spawn<F>(&mut self, name: &'static str, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(f)
            .map_err(EmberError::Io)?;
        self.handles.push((name, handle));
        Ok(())
    }

    fn shutdown(&mut self) {
        // Disconnecting the channel wakes every `select!`.
        drop(self.shutdown.take());
        for (name, handle) in self.handles.drain(..) {
            if handle.join().is_err() {
                error!(task = name, "Background task panicked");
            }
        }
        info!("Background tasks stopped");
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        if self.shutdown.is_some() {
            self.shutdown();
        }
    }
}

fn sync_loop(inner: Arc<Inner>, shutdown: Receiver<()>) {
    let ticker = channel::tick(SYNC_INTERVAL);
    loop {
        select! {
            recv(ticker) -> _ => {
                if let Err(e) = inner.sync_wal() {
                    warn!(error = %e, "WAL sync failed");
                }
            }
            recv(shutdown) -> _ => break,
        }
    }
    debug!("Sync task exiting");
}

fn maintenance_loop(inner: Arc<Inner>, schedule: Option<cron::Schedule>, shutdown: Receiver<()>) {
    let ticker = channel::tick(inner.config().expire_interval);
    let mut rng = rand::thread_rng();
    let next_fire = |schedule: &Option<cron::Schedule>| -> Option<DateTime<Utc>> {
        schedule.as_ref().and_then(|s| s.upcoming(Utc).next())
    };
    let mut next_shrink = next_fire(&schedule);

    loop {
        select! {
            recv(ticker) -> _ => {
                let shard = rng.gen_range(0..inner.shard_count());
                let evicted = inner.evict_expired(shard, rng.gen());
                if evicted > 0 {
                    debug!(shard, evicted, "Expired keys evicted");
                }

                if next_shrink.is_some_and(|at| Utc::now() >= at) {
                    run_scheduled_shrink(&inner);
                    next_shrink = next_fire(&schedule);
                }
            }
            recv(shutdown) -> _ => break,
        }
    }
    debug!("Maintenance task exiting");
}

fn run_scheduled_shrink(inner: &Inner) {
    match inner.shrink() {
        Ok(()) => {}
        Err(EmberError::ShrinkAlreadyRunning) => {
            debug!("Scheduled shrink skipped, already running");
        }
        Err(EmberError::DatabaseClosed) => {}
        Err(e) => warn!(error = %e, "Scheduled shrink failed"),
    }
}

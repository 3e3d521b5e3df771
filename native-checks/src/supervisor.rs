//! Housekeeping thread: keeps the roster full and handlers fresh.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::cache::HandlerCache;
use crate::config::duration::format_duration;
use crate::config::PoolConfig;
use crate::errors::{PoolError, Result};
use crate::interrupt::Interrupt;
use crate::pool::WorkerPool;

/// Ticks on a coarse interval and runs two duties on their own cadence:
/// replacing dead workers, and evicting handlers whose script changed.
pub struct Supervisor {
    pool: Arc<WorkerPool>,
    cache: Arc<HandlerCache>,
    interrupt: Interrupt,
    tick: Duration,
    check_threads_every: Duration,
    check_plugins_timestamps_every: Duration,
}

impl Supervisor {
    pub fn new(
        pool: Arc<WorkerPool>,
        cache: Arc<HandlerCache>,
        interrupt: Interrupt,
        config: &PoolConfig,
    ) -> Self {
        Self {
            pool,
            cache,
            interrupt,
            tick: config.supervisor_tick,
            check_threads_every: config.check_threads_every,
            check_plugins_timestamps_every: config.check_plugins_timestamps_every,
        }
    }

    /// Run on a dedicated thread until interrupted.
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("check-supervisor".to_string())
            .spawn(move || self.run())
            .map_err(|source| PoolError::Spawn {
                what: "supervisor".to_string(),
                source,
            })
    }

    pub fn run(&self) {
        debug!(
            "Supervisor started (threads every {}, handlers every {})",
            format_duration(&self.check_threads_every),
            format_duration(&self.check_plugins_timestamps_every)
        );

        let mut last_threads = Instant::now();
        let mut last_plugins = Instant::now();

        while !self.interrupt.wait(self.tick) {
            let now = Instant::now();

            if now.duration_since(last_threads) >= self.check_threads_every {
                last_threads = now;
                self.check_threads();
            }

            if now.duration_since(last_plugins) >= self.check_plugins_timestamps_every {
                last_plugins = now;
                self.check_plugin_timestamps();
            }
        }

        debug!("Supervisor stopped");
    }

    /// Replace dead workers. Returns how many were found dead.
    pub fn check_threads(&self) -> usize {
        match self.pool.heal() {
            Ok(dead) => dead.len(),
            Err(e) => {
                error!("Failed to respawn workers: {}", e);
                0
            }
        }
    }

    /// Evict handlers whose script is newer than the loaded copy.
    ///
    /// Returns the evicted names; the next check for each reloads it.
    pub fn check_plugin_timestamps(&self) -> BTreeSet<String> {
        let stale = self.cache.scan_stale();
        if !stale.is_empty() {
            info!("Reloading modified handlers: {:?}", stale);
            self.cache.evict(&stale);
        }
        stale
    }
}

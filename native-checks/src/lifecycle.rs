//! Module facade: start and stop the pool as one unit.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info};

use crate::cache::HandlerCache;
use crate::config::PoolConfig;
use crate::errors::{PoolError, Result};
use crate::executor::Executor;
use crate::interrupt::Interrupt;
use crate::loader::{HandlerLoader, LuaLoader};
use crate::pool::{WorkerInfo, WorkerPool};
use crate::queue::{Inbound, Outbound};
use crate::supervisor::Supervisor;

/// How the host daemon sees this module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleProperties {
    pub module_type: &'static str,
    pub daemons: &'static [&'static str],
    pub phases: &'static [&'static str],
    pub worker_capable: bool,
}

pub const MODULE_PROPERTIES: ModuleProperties = ModuleProperties {
    module_type: "native_plugins",
    daemons: &["poller", "reactionner"],
    phases: &["running"],
    worker_capable: true,
};

struct Running {
    interrupt: Interrupt,
    pool: Arc<WorkerPool>,
    supervisor: JoinHandle<()>,
}

/// Owns the handler cache and, while started, the workers and supervisor.
///
/// The cache outlives restarts, so handlers loaded before a `stop()` are
/// still warm after the next `start()`.
pub struct NativeChecks {
    config: PoolConfig,
    cache: Arc<HandlerCache>,
    running: Mutex<Option<Running>>,
}

impl NativeChecks {
    /// Handlers are looked up in `config.plugin_dirs`.
    pub fn new(config: PoolConfig) -> Self {
        let loader = LuaLoader::new(config.plugin_dirs.clone());
        Self::with_loader(config, Arc::new(loader))
    }

    pub fn with_loader(config: PoolConfig, loader: Arc<dyn HandlerLoader>) -> Self {
        Self {
            config,
            cache: Arc::new(HandlerCache::new(loader)),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<HandlerCache> {
        &self.cache
    }

    /// Spawn `worker_threads` workers reading `inbound` and the supervisor.
    pub fn start(&self, inbound: Arc<dyn Inbound>, outbound: Arc<dyn Outbound>) -> Result<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(PoolError::AlreadyStarted);
        }

        let interrupt = Interrupt::new();
        let executor = Arc::new(Executor::new(Arc::clone(&self.cache), outbound));
        let pool = Arc::new(WorkerPool::new(
            self.config.worker_threads,
            self.config.receive_timeout,
            executor,
            inbound,
            interrupt.clone(),
        ));

        let supervisor = pool.fill().and_then(|_| {
            Supervisor::new(
                Arc::clone(&pool),
                Arc::clone(&self.cache),
                interrupt.clone(),
                &self.config,
            )
            .spawn()
        });

        let supervisor = match supervisor {
            Ok(handle) => handle,
            Err(e) => {
                // Do not leave half a pool behind
                interrupt.trigger();
                pool.join_all();
                return Err(e);
            }
        };

        info!("Started {} check workers", pool.len());
        *running = Some(Running {
            interrupt,
            pool,
            supervisor,
        });
        Ok(())
    }

    /// Interrupt and join every thread. Safe to call repeatedly.
    ///
    /// Returns once in-flight checks have finished; a handler that never
    /// returns blocks this forever.
    pub fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };

        running.interrupt.trigger();
        if running.supervisor.join().is_err() {
            error!("Supervisor thread panicked");
        }
        running.pool.join_all();
        info!("Stopped check workers");
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Snapshot of the worker roster; empty when stopped.
    pub fn roster(&self) -> Vec<WorkerInfo> {
        self.running
            .lock()
            .as_ref()
            .map(|r| r.pool.roster())
            .unwrap_or_default()
    }
}

impl Drop for NativeChecks {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for NativeChecks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeChecks")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::CheckRequest;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    fn config() -> PoolConfig {
        PoolConfig {
            worker_threads: 2,
            receive_timeout: Duration::from_millis(20),
            supervisor_tick: Duration::from_millis(20),
            ..PoolConfig::default()
        }
    }

    #[test]
    fn test_module_properties() {
        assert_eq!(MODULE_PROPERTIES.module_type, "native_plugins");
        assert_eq!(MODULE_PROPERTIES.daemons, &["poller", "reactionner"]);
        assert_eq!(MODULE_PROPERTIES.phases, &["running"]);
        assert!(MODULE_PROPERTIES.worker_capable);
    }

    #[test]
    fn test_start_stop() {
        let checks = NativeChecks::new(config());
        let (_submit, inbound) = unbounded::<CheckRequest>();
        let (outbound, _results) = unbounded::<CheckRequest>();

        assert!(!checks.is_running());
        checks.start(Arc::new(inbound), Arc::new(outbound)).unwrap();
        assert!(checks.is_running());
        assert_eq!(checks.roster().len(), checks.config().worker_threads);

        checks.stop();
        assert!(!checks.is_running());
        assert!(checks.roster().is_empty());
        checks.stop();
    }

    #[test]
    fn test_double_start_is_rejected() {
        let checks = NativeChecks::new(config());
        let (_submit, inbound) = unbounded::<CheckRequest>();
        let (outbound, _results) = unbounded::<CheckRequest>();
        let inbound = Arc::new(inbound);
        let outbound = Arc::new(outbound);

        checks.start(inbound.clone(), outbound.clone()).unwrap();
        let err = checks.start(inbound.clone(), outbound.clone()).unwrap_err();
        assert!(matches!(err, PoolError::AlreadyStarted));

        checks.stop();
        checks.start(inbound, outbound).unwrap();
        assert!(checks.is_running());
    }
}

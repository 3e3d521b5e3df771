//! Fixed-size pool of check worker threads.
//!
//! Each worker loops: wait (bounded) on the inbound queue, run the check,
//! hand it back. Workers only leave their loop when interrupted or when
//! something panics outside per-check containment; the supervisor notices
//! the dead thread through [`WorkerPool::heal`] and replaces it.

use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::check::CheckRequest;
use crate::errors::{PoolError, Result};
use crate::executor::Executor;
use crate::interrupt::Interrupt;
use crate::queue::{Inbound, Received};

/// The check a worker is currently running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlight {
    pub check_id: u64,
    pub command: String,
}

impl From<&CheckRequest> for InFlight {
    fn from(check: &CheckRequest) -> Self {
        Self {
            check_id: check.id,
            command: check.command.clone(),
        }
    }
}

/// Diagnostics snapshot of one roster slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    pub id: usize,
    pub alive: bool,
    pub current: Option<InFlight>,
    pub checks_completed: u64,
}

/// State a worker publishes about itself
#[derive(Debug, Default)]
struct SlotState {
    current: Mutex<Option<InFlight>>,
    completed: AtomicU64,
}

impl SlotState {
    fn begin(&self, check: &CheckRequest) {
        *self.current.lock() = Some(InFlight::from(check));
    }

    fn finish(&self) {
        *self.current.lock() = None;
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// One roster entry: a worker thread and what it reports.
pub struct WorkerSlot {
    id: usize,
    handle: JoinHandle<()>,
    state: Arc<SlotState>,
}

impl WorkerSlot {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn info(&self) -> WorkerInfo {
        WorkerInfo {
            id: self.id,
            alive: self.is_alive(),
            current: self.state.current.lock().clone(),
            checks_completed: self.state.completed.load(Ordering::Relaxed),
        }
    }
}

pub struct WorkerPool {
    size: usize,
    receive_timeout: Duration,
    executor: Arc<Executor>,
    inbound: Arc<dyn Inbound>,
    interrupt: Interrupt,
    /// Written by the supervisor and by shutdown only
    roster: Mutex<Vec<WorkerSlot>>,
    next_id: AtomicUsize,
}

impl WorkerPool {
    pub fn new(
        size: usize,
        receive_timeout: Duration,
        executor: Arc<Executor>,
        inbound: Arc<dyn Inbound>,
        interrupt: Interrupt,
    ) -> Self {
        Self {
            size,
            receive_timeout,
            executor,
            inbound,
            interrupt,
            roster: Mutex::new(Vec::with_capacity(size)),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Target number of workers
    pub fn size(&self) -> usize {
        self.size
    }

    /// Spawn workers until the roster holds `size` of them.
    pub fn fill(&self) -> Result<usize> {
        let mut roster = self.roster.lock();
        self.fill_locked(&mut roster)
    }

    fn fill_locked(&self, roster: &mut Vec<WorkerSlot>) -> Result<usize> {
        let mut spawned = 0;
        while roster.len() < self.size && !self.interrupt.is_set() {
            roster.push(self.spawn_worker()?);
            spawned += 1;
        }
        Ok(spawned)
    }

    fn spawn_worker(&self) -> Result<WorkerSlot> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(SlotState::default());

        let worker = Worker {
            id,
            executor: Arc::clone(&self.executor),
            inbound: Arc::clone(&self.inbound),
            interrupt: self.interrupt.clone(),
            receive_timeout: self.receive_timeout,
            state: Arc::clone(&state),
        };

        let handle = thread::Builder::new()
            .name(format!("check-worker-{}", id))
            .spawn(move || worker.run())
            .map_err(|source| PoolError::Spawn {
                what: format!("worker {}", id),
                source,
            })?;

        Ok(WorkerSlot { id, handle, state })
    }

    /// Replace workers whose thread has exited. Does nothing once interrupted.
    ///
    /// Returns the dead workers that were removed.
    pub fn heal(&self) -> Result<Vec<WorkerInfo>> {
        if self.interrupt.is_set() {
            return Ok(Vec::new());
        }

        let mut roster = self.roster.lock();
        let (alive, dead): (Vec<_>, Vec<_>) = std::mem::take(&mut *roster)
            .into_iter()
            .partition(WorkerSlot::is_alive);
        *roster = alive;

        let mut removed = Vec::with_capacity(dead.len());
        for slot in dead {
            let info = slot.info();
            match &info.current {
                Some(in_flight) => warn!(
                    "Worker {} died while running check {} ({}); that check may be lost",
                    info.id, in_flight.check_id, in_flight.command
                ),
                None => warn!("Worker {} died while idle", info.id),
            }
            let _ = slot.handle.join();
            removed.push(info);
        }

        if !removed.is_empty() {
            let spawned = self.fill_locked(&mut roster)?;
            info!(
                "Respawned {} worker(s), roster back to {}/{}",
                spawned,
                roster.len(),
                self.size
            );
        }

        Ok(removed)
    }

    pub fn roster(&self) -> Vec<WorkerInfo> {
        self.roster.lock().iter().map(WorkerSlot::info).collect()
    }

    pub fn len(&self) -> usize {
        self.roster.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.lock().is_empty()
    }

    pub fn alive_count(&self) -> usize {
        self.roster.lock().iter().filter(|s| s.is_alive()).count()
    }

    /// Join every worker. Callers raise the interrupt first.
    pub fn join_all(&self) {
        let slots = std::mem::take(&mut *self.roster.lock());
        for slot in slots {
            if slot.handle.join().is_err() {
                error!("Worker {} panicked during shutdown", slot.id);
            }
        }
    }
}

/// Everything a worker thread owns
struct Worker {
    id: usize,
    executor: Arc<Executor>,
    inbound: Arc<dyn Inbound>,
    interrupt: Interrupt,
    receive_timeout: Duration,
    state: Arc<SlotState>,
}

impl Worker {
    fn run(self) {
        debug!("Worker {} started", self.id);

        match panic::catch_unwind(AssertUnwindSafe(|| self.work())) {
            Ok(()) => debug!("Worker {} stopped", self.id),
            Err(payload) => error!(
                "Fatal error in worker {}: {}",
                self.id,
                panic_message(payload.as_ref())
            ),
        }
    }

    fn work(&self) {
        while !self.interrupt.is_set() {
            match self.inbound.receive(self.receive_timeout) {
                Received::Check(check) => {
                    self.state.begin(&check);
                    self.executor.execute(check);
                    self.state.finish();
                }
                Received::Empty => {}
                Received::Closed => {
                    // Nothing will ever arrive; idle until interrupted instead of spinning
                    self.interrupt.wait(self.receive_timeout);
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

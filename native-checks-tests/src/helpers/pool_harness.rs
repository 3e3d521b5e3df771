//! A running pool wired to in-memory queues

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use native_checks::errors::PoolError;
use native_checks::pool::WorkerInfo;
use native_checks::{CheckRequest, NativeChecks, Outbound, PoolConfig};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::handler_files::HandlerDir;

/// Short intervals so supervision is observable within a test.
pub fn fast_config(handlers: &HandlerDir) -> PoolConfig {
    PoolConfig {
        worker_threads: 3,
        check_threads_every: Duration::from_millis(50),
        check_plugins_timestamps_every: Duration::from_millis(50),
        supervisor_tick: Duration::from_millis(10),
        receive_timeout: Duration::from_millis(20),
        plugin_dirs: vec![handlers.path().to_path_buf()],
        ..PoolConfig::default()
    }
}

/// Outbound queue that can be told to panic on chosen commands.
///
/// Panicking here runs on the worker thread after the check completed,
/// so it kills the worker the way an uncontained fault would.
pub struct TestOutbound {
    tx: Sender<CheckRequest>,
    panic_on: Mutex<HashSet<String>>,
}

impl TestOutbound {
    pub fn new(tx: Sender<CheckRequest>) -> Self {
        Self {
            tx,
            panic_on: Mutex::new(HashSet::new()),
        }
    }

    pub fn panic_on(&self, command: &str) {
        self.panic_on.lock().insert(command.to_string());
    }
}

impl Outbound for TestOutbound {
    fn send(&self, check: CheckRequest) {
        if self.panic_on.lock().contains(&check.command) {
            panic!("outbound refused check {} ({})", check.id, check.command);
        }
        let _ = self.tx.send(check);
    }
}

pub struct TestPoolHarness {
    pub handlers: HandlerDir,
    pub checks: NativeChecks,
    submit: Sender<CheckRequest>,
    inbound: Arc<Receiver<CheckRequest>>,
    outbound: Arc<TestOutbound>,
    results: Receiver<CheckRequest>,
    next_id: AtomicU64,
}

impl TestPoolHarness {
    /// Harness over `handlers` with [`fast_config`]; not started yet.
    pub fn new(handlers: HandlerDir) -> Self {
        let config = fast_config(&handlers);
        Self::with_config(handlers, config)
    }

    pub fn with_config(handlers: HandlerDir, config: PoolConfig) -> Self {
        crate::init_test_logging();

        let (submit, inbound) = unbounded();
        let (out_tx, results) = unbounded();
        Self {
            handlers,
            checks: NativeChecks::new(config),
            submit,
            inbound: Arc::new(inbound),
            outbound: Arc::new(TestOutbound::new(out_tx)),
            results,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn start(&self) -> Result<(), PoolError> {
        self.checks
            .start(self.inbound.clone(), self.outbound.clone())
    }

    pub fn stop(&self) {
        debug!("Stopping test pool");
        self.checks.stop();
    }

    pub fn outbound(&self) -> &TestOutbound {
        &self.outbound
    }

    pub fn roster(&self) -> Vec<WorkerInfo> {
        self.checks.roster()
    }

    /// Queue a check, returning its id.
    pub fn submit(&self, command: &str) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        // The harness holds the receiver, so the channel cannot be closed
        let _ = self.submit.send(CheckRequest::new(id, command));
        id
    }

    /// Wait for `count` results in arrival order; fewer on timeout.
    pub fn collect(&self, count: usize, timeout: Duration) -> Vec<CheckRequest> {
        let deadline = Instant::now() + timeout;
        let mut done = Vec::with_capacity(count);
        while done.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.results.recv_timeout(remaining) {
                Ok(check) => done.push(check),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        done
    }

    /// Submit one check and wait for its result.
    pub fn run_check(&self, command: &str, timeout: Duration) -> Option<CheckRequest> {
        let id = self.submit(command);
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.results.recv_timeout(remaining) {
                Ok(check) if check.id == id => return Some(check),
                Ok(other) => debug!("Skipping unrelated result for check {}", other.id),
                Err(_) => return None,
            }
        }
    }

    /// Whether any result is waiting right now
    pub fn has_pending_results(&self) -> bool {
        !self.results.is_empty()
    }
}

impl Drop for TestPoolHarness {
    fn drop(&mut self) {
        self.checks.stop();
    }
}

//! Polling utilities to wait for threads to settle

use native_checks::NativeChecks;
use std::thread::sleep;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Error type for wait operations
#[derive(Debug)]
pub enum WaitError {
    Timeout(String),
}

impl std::fmt::Display for WaitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitError::Timeout(what) => write!(f, "Timed out waiting for {}", what),
        }
    }
}

impl std::error::Error for WaitError {}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(
    what: &str,
    timeout: Duration,
    mut condition: impl FnMut() -> bool,
) -> Result<(), WaitError> {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return Ok(());
        }
        sleep(POLL_INTERVAL);
    }
    if condition() {
        Ok(())
    } else {
        Err(WaitError::Timeout(what.to_string()))
    }
}

/// Wait until the roster holds exactly `size` live workers.
pub fn wait_for_roster(
    checks: &NativeChecks,
    size: usize,
    timeout: Duration,
) -> Result<(), WaitError> {
    wait_until(&format!("{} live workers", size), timeout, || {
        let roster = checks.roster();
        roster.len() == size && roster.iter().all(|w| w.alive)
    })
}

//! Test utilities for the native-checks workspace
//!
//! Handler script fixtures on temporary directories, a pool harness wired
//! to in-memory queues, and polling helpers for asserting on threads that
//! settle asynchronously.

pub mod helpers;

pub use helpers::handler_files::HandlerDir;
pub use helpers::pool_harness::{fast_config, TestOutbound, TestPoolHarness};
pub use helpers::wait_utils::{wait_for_roster, wait_until, WaitError};

/// Install a test subscriber once; later calls are no-ops.
///
/// Honors `RUST_LOG`, defaults to `warn`.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

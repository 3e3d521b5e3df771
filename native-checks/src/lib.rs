//! Runs monitoring checks in-process through Lua handler scripts.
//!
//! A [`NativeChecks`] pool pulls [`CheckRequest`]s from an inbound queue,
//! runs each through the handler named by its command's first token and
//! pushes the completed request to an outbound queue. A supervisor thread
//! respawns dead workers and reloads handlers whose script changed on disk.

pub mod cache;
pub mod check;
pub mod config;
pub mod errors;
pub mod executor;
pub mod handler;
pub mod interrupt;
pub mod lifecycle;
pub mod loader;
pub mod pool;
pub mod queue;
pub mod supervisor;
pub mod tokenize;

pub use check::{CheckRequest, CheckResult, CheckStatus, UNKNOWN_EXIT_STATUS};
pub use config::PoolConfig;
pub use lifecycle::{NativeChecks, MODULE_PROPERTIES};
pub use queue::{Inbound, Message, Outbound, Received};

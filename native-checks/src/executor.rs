//! Runs one check request end to end.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::cache::HandlerCache;
use crate::check::{CheckRequest, CheckResult, CheckStatus, UNKNOWN_EXIT_STATUS};
use crate::errors::CheckError;
use crate::handler::HandlerEntry;
use crate::queue::Outbound;
use crate::tokenize::tokenize;

/// Turns check requests into completed checks.
///
/// The handler is looked up through the cache on every call, so a reloaded
/// script is picked up by the very next check. There is no execution
/// timeout: a handler that never returns holds its worker forever.
pub struct Executor {
    cache: Arc<HandlerCache>,
    outbound: Arc<dyn Outbound>,
}

impl Executor {
    pub fn new(cache: Arc<HandlerCache>, outbound: Arc<dyn Outbound>) -> Self {
        Self { cache, outbound }
    }

    /// Complete `check` and hand it to the outbound queue.
    pub fn execute(&self, mut check: CheckRequest) {
        self.complete(&mut check);
        self.outbound.send(check);
    }

    /// Fill in every result field of `check`. Failures become exit status 3.
    pub fn complete(&self, check: &mut CheckRequest) {
        let prepared = self.prepare(&check.command);

        let check_time = Utc::now();
        let started = Instant::now();
        let outcome = prepared.and_then(|(entry, args)| {
            entry
                .handler
                .invoke(&args)
                .map_err(|e| CheckError::HandlerRuntime {
                    name: entry.name.clone(),
                    message: e.to_string(),
                })
        });
        let elapsed = started.elapsed();

        match outcome {
            Ok(result) => {
                apply_result(check, &result);
                debug!(
                    check_id = check.id,
                    exit_status = check.exit_status,
                    "{} : {}",
                    check.command,
                    check.status_line()
                );
            }
            Err(e) => {
                warn!(check_id = check.id, "Check '{}' failed: {}", check.command, e);
                apply_failure(check, &e);
            }
        }

        check.check_time = Some(check_time);
        check.execution_time = Some(elapsed);
        check.status = CheckStatus::Done;
    }

    /// Tokenize the command and resolve its handler.
    fn prepare(&self, command: &str) -> Result<(Arc<HandlerEntry>, Vec<String>), CheckError> {
        let mut tokens = tokenize(command)?;
        if tokens.is_empty() {
            return Err(CheckError::EmptyCommand);
        }
        let args = tokens.split_off(1);
        let entry = self.cache.resolve(&tokens[0])?;
        Ok((entry, args))
    }
}

fn apply_result(check: &mut CheckRequest, result: &CheckResult) {
    check.exit_status = result.return_code;
    check.output = result.output.clone();
    check.perf_data = result.joined_perf_data();
}

fn apply_failure(check: &mut CheckRequest, error: &CheckError) {
    // Lua errors carry a traceback after the first line; the log has it in full
    let message = error.to_string();
    let first_line = message.lines().next().unwrap_or_default();

    check.exit_status = UNKNOWN_EXIT_STATUS;
    check.output = format!("Check '{}' failed: {}", check.command, first_line);
    check.perf_data.clear();
}

//! Check requests and handler results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exit status reported when a check could not be run at all.
pub const UNKNOWN_EXIT_STATUS: i32 = 3;

/// Processing state of a check request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    #[default]
    Pending,
    Done,
    Error,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Pending => "pending",
            CheckStatus::Done => "done",
            CheckStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work: a command line plus the fields that receive its outcome.
///
/// Created by the host scheduler, owned by one worker while it runs, then
/// handed back through the outbound queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub id: u64,
    pub command: String,
    pub status: CheckStatus,
    pub exit_status: i32,
    pub output: String,
    pub perf_data: String,
    pub check_time: Option<DateTime<Utc>>,
    pub execution_time: Option<Duration>,
}

impl CheckRequest {
    pub fn new(id: u64, command: impl Into<String>) -> Self {
        Self {
            id,
            command: command.into(),
            status: CheckStatus::Pending,
            exit_status: 0,
            output: String::new(),
            perf_data: String::new(),
            check_time: None,
            execution_time: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == CheckStatus::Done
    }

    /// Nagios-style single line: `output|perf_data`
    pub fn status_line(&self) -> String {
        if self.perf_data.is_empty() {
            self.output.clone()
        } else {
            format!("{}|{}", self.output, self.perf_data)
        }
    }
}

/// What a handler returns for one invocation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CheckResult {
    pub return_code: i32,
    pub output: String,
    pub perf_datas: Vec<String>,
}

impl CheckResult {
    pub fn new(return_code: i32, output: impl Into<String>) -> Self {
        Self {
            return_code,
            output: output.into(),
            perf_datas: Vec::new(),
        }
    }

    pub fn with_perf_data(mut self, field: impl Into<String>) -> Self {
        self.perf_datas.push(field.into());
        self
    }

    /// Performance fields joined the way monitoring hosts expect them.
    pub fn joined_perf_data(&self) -> String {
        self.perf_datas.join("|")
    }
}

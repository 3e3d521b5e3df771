//! Pool configuration.
//!
//! Read from a flat YAML mapping. Every key is optional and parsed on its
//! own: a bad value is reported with a warning and replaced by its default,
//! so a typo never keeps the pool from starting. Only an unreadable file or
//! broken YAML is an error.

pub mod duration;

use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing::warn;

use crate::errors::ConfigError;
use duration::parse_duration;

pub const DEFAULT_WORKER_THREADS: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Number of workers kept alive
    pub worker_threads: usize,
    pub logging_level: LevelFilter,
    /// How often the supervisor looks for dead workers
    pub check_threads_every: Duration,
    /// How often the supervisor looks for changed handler scripts
    pub check_plugins_timestamps_every: Duration,
    /// Granularity of the supervisor loop
    pub supervisor_tick: Duration,
    /// Bounded wait on the inbound queue; also bounds worker shutdown latency
    pub receive_timeout: Duration,
    /// Initial handler search path
    pub plugin_dirs: Vec<PathBuf>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            logging_level: LevelFilter::INFO,
            check_threads_every: Duration::from_secs(10),
            check_plugins_timestamps_every: Duration::from_secs(60),
            supervisor_tick: Duration::from_secs(1),
            receive_timeout: Duration::from_millis(500),
            plugin_dirs: Vec::new(),
        }
    }
}

impl PoolConfig {
    /// Load from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;
        Self::from_yaml_str(&contents, path)
    }

    /// Parse YAML text; `origin` is only used in error messages.
    pub fn from_yaml_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        let de = serde_yaml::Deserializer::from_str(contents);
        let root: Value =
            serde_path_to_error::deserialize(de).map_err(|e| ConfigError::Parse {
                path: origin.to_path_buf(),
                source: e,
            })?;

        match root {
            Value::Null => Ok(Self::default()),
            Value::Mapping(map) => Ok(Self::from_mapping(&map)),
            _ => Err(ConfigError::NotAMapping(origin.to_path_buf())),
        }
    }

    /// Build from an already-parsed mapping, falling back per key.
    pub fn from_mapping(map: &Mapping) -> Self {
        let mut config = Self::default();

        for (key, value) in map {
            let Some(key) = key.as_str() else {
                warn!("Ignoring non-string config key {:?}", key);
                continue;
            };

            match key {
                "worker_threads" => apply(&mut config.worker_threads, key, value, parse_count(value)),
                "logging_level" => apply(&mut config.logging_level, key, value, parse_level(value)),
                "check_threads_every" => {
                    apply(&mut config.check_threads_every, key, value, parse_interval(value))
                }
                "check_plugins_timestamps_every" => apply(
                    &mut config.check_plugins_timestamps_every,
                    key,
                    value,
                    parse_interval(value),
                ),
                "supervisor_tick" => apply(&mut config.supervisor_tick, key, value, parse_interval(value)),
                "receive_timeout" => apply(&mut config.receive_timeout, key, value, parse_interval(value)),
                "plugin_dirs" => apply(&mut config.plugin_dirs, key, value, parse_dirs(value)),
                other => warn!("Ignoring unknown config key '{}'", other),
            }
        }

        config
    }
}

fn apply<T: std::fmt::Debug>(slot: &mut T, key: &str, value: &Value, parsed: Result<T, String>) {
    match parsed {
        Ok(v) => *slot = v,
        Err(reason) => warn!(
            "Invalid value {:?} for '{}' ({}), using default {:?}",
            value, key, reason, slot
        ),
    }
}

/// Scalars arrive either typed or as strings, depending on who wrote the file.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_count(value: &Value) -> Result<usize, String> {
    let text = scalar_text(value).ok_or("expected an integer")?;
    match text.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

fn parse_level(value: &Value) -> Result<LevelFilter, String> {
    let text = scalar_text(value).ok_or("expected a level name")?;
    match text.to_lowercase().as_str() {
        "warning" => Ok(LevelFilter::WARN),
        "critical" | "fatal" => Ok(LevelFilter::ERROR),
        other => other.parse::<LevelFilter>().map_err(|e| e.to_string()),
    }
}

/// Duration string, or a plain number of seconds
fn parse_interval(value: &Value) -> Result<Duration, String> {
    let duration = match value {
        Value::Number(n) => {
            let secs = n.as_f64().ok_or("not a number")?;
            if !secs.is_finite() || secs < 0.0 {
                return Err("must be a positive number of seconds".to_string());
            }
            Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())?
        }
        Value::String(s) => parse_duration(s)?,
        _ => return Err("expected a duration such as \"10s\"".to_string()),
    };

    if duration.is_zero() {
        return Err("must be greater than zero".to_string());
    }
    Ok(duration)
}

fn parse_dirs(value: &Value) -> Result<Vec<PathBuf>, String> {
    match value {
        Value::String(s) => Ok(vec![PathBuf::from(s)]),
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(PathBuf::from)
                    .ok_or_else(|| format!("directory entry {:?} is not a string", item))
            })
            .collect(),
        _ => Err("expected a directory or a list of directories".to_string()),
    }
}

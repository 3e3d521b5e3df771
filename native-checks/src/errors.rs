use std::path::PathBuf;
use thiserror::Error;

/// Format a YAML error for user-friendly display, including the field path
fn format_yaml_error(e: &serde_path_to_error::Error<serde_yaml::Error>) -> String {
    let path = e.path().to_string();
    let inner = e.inner();
    let msg = inner.to_string();

    let located = if let Some(loc) = inner.location() {
        format!("Line {}, Column {}: {}", loc.line(), loc.column(), msg)
    } else {
        msg
    };

    if path.is_empty() || path == "." {
        located
    } else {
        format!("{}: {}", path, located)
    }
}

/// Malformed command string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unterminated {0} quote")]
    UnterminatedQuote(char),

    #[error("trailing escape character")]
    TrailingEscape,
}

/// A handler name could not be turned into a usable handler.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("No handler named '{name}' in search path {searched:?}")]
    NotFound { name: String, searched: Vec<PathBuf> },

    #[error("Failed to read handler source {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Lua error while loading {path}: {message}")]
    Lua { path: PathBuf, message: String },

    #[error("{path} defines neither a Plugin type with execute() nor a main() function")]
    NoEntryPoint { path: PathBuf },
}

/// Everything that can go wrong while running a single check.
///
/// These never leave the executor: they are rendered into the check's
/// output with exit status 3.
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("Malformed command: {0}")]
    Parse(#[from] ParseError),

    #[error("Empty command")]
    EmptyCommand,

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Handler '{name}' failed: {message}")]
    HandlerRuntime { name: String, message: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config '{path}':\n  {}", format_yaml_error(.source))]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_path_to_error::Error<serde_yaml::Error>,
    },

    #[error("Config '{0}' must be a YAML mapping")]
    NotAMapping(PathBuf),
}

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Failed to spawn {what} thread: {source}")]
    Spawn {
        what: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Pool already started")]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, PoolError>;

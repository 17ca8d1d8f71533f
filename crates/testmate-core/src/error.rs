//! Error types and handling for test discovery and execution

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for discovery, reload and execution operations
#[derive(Debug, Error)]
pub enum TestmateError {
    /// Configuration loading or validation errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// File system I/O errors
    #[error("IO error for path '{path}': {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The executable could not be started at all
    #[error("Failed to start '{path}': {source}")]
    SpawnError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Listing the tests of an executable failed
    #[error("Reload of '{path}' failed: {message}")]
    ReloadError { path: PathBuf, message: String },

    /// Framework output could not be parsed
    #[error("Parse error: {message}")]
    ParseError { message: String },

    /// Invalid executable pattern
    #[error("Invalid pattern '{pattern}': {message}")]
    PatternError { pattern: String, message: String },

    /// File system watch could not be installed
    #[error("Watch error for path '{path}': {message}")]
    WatchError { path: PathBuf, message: String },

    /// A suite was asked to run while its process is still alive
    #[error("Suite '{suite}' is already running")]
    AlreadyRunning { suite: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

/// Error kind enumeration for categorizing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Io,
    Spawn,
    Reload,
    Parse,
    Pattern,
    Watch,
    AlreadyRunning,
    Internal,
}

impl TestmateError {
    /// Get the error kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            TestmateError::ConfigError { .. } => ErrorKind::Config,
            TestmateError::IoError { .. } => ErrorKind::Io,
            TestmateError::SpawnError { .. } => ErrorKind::Spawn,
            TestmateError::ReloadError { .. } => ErrorKind::Reload,
            TestmateError::ParseError { .. } => ErrorKind::Parse,
            TestmateError::PatternError { .. } => ErrorKind::Pattern,
            TestmateError::WatchError { .. } => ErrorKind::Watch,
            TestmateError::AlreadyRunning { .. } => ErrorKind::AlreadyRunning,
            TestmateError::InternalError { .. } => ErrorKind::Internal,
        }
    }

    /// Check if this error is recoverable (the tree stays usable afterwards)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Spawn
                | ErrorKind::Reload
                | ErrorKind::Parse
                | ErrorKind::Watch
                | ErrorKind::AlreadyRunning
        )
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create an IO error with path context
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            source,
        }
    }

    /// Create a spawn error
    pub fn spawn_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SpawnError {
            path: path.into(),
            source,
        }
    }

    /// Create a reload error
    pub fn reload_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ReloadError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
        }
    }

    /// Create a pattern error
    pub fn pattern_error(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PatternError {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Create a watch error
    pub fn watch_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::WatchError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for TestmateError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError {
            path: PathBuf::new(),
            source: err,
        }
    }
}

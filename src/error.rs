//! Error types for AbiQueue
//!
//! This module defines all error types used throughout the crate,
//! providing detailed error information for debugging and user feedback.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for AbiQueue operations
#[derive(Error, Debug)]
pub enum AbiQueueError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML document could not be parsed
    #[error("YAML error in {origin}: {message}")]
    Yaml { origin: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The configuration file exists neither in the working directory nor
    /// in the user configuration directory
    #[error("Cannot locate `{filename}` neither in the current directory nor in `{searched}`.\n\
             A minimalistic example is reported below:\n\n{example}")]
    MissingConfig {
        filename: String,
        searched: PathBuf,
        example: String,
    },

    /// Invalid memory or time value
    #[error("Invalid {kind} value '{value}'")]
    InvalidUnit { kind: &'static str, value: String },

    /// Malformed condition mapping
    #[error("Invalid condition: {0}")]
    ConditionError(String),

    /// Malformed or missing autoparal section
    #[error("Autoparal hints error: {0}")]
    ParalHintsError(String),

    /// A queue adapter limit has been reached
    #[error("Queue adapter '{qname}' (priority {priority}): {message}")]
    QueueAdapterLimit {
        qname: String,
        priority: i64,
        message: String,
    },

    /// The adapter refuses to launch the job again
    #[error("num_launches {num_launches} == max_num_launches {max_num_launches}")]
    MaxNumLaunches {
        num_launches: u32,
        max_num_launches: u32,
    },

    /// Manager failed to increase resources
    #[error("Manager failed to {0}")]
    ManagerIncrease(String),

    /// No queue adapter can run any of the parallel configurations
    #[error("Cannot find qadapter for this run")]
    NoQadapter,

    /// Locked requests are never submitted
    #[error("You shall not submit a locked job: {0}")]
    LockedJob(String),

    /// Queue command failed
    #[error("Queue command '{command}' failed: {message}")]
    QueueCommand { command: String, message: String },

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<AbiQueueError>,
    },
}

impl AbiQueueError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a YAML error with the document origin
    pub fn yaml(origin: impl Into<String>, err: serde_yaml::Error) -> Self {
        Self::Yaml {
            origin: origin.into(),
            message: err.to_string(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create a queue command error
    pub fn queue_command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QueueCommand {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check if this error is transient (the scheduler may retry later)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io { .. } | Self::QueueCommand { .. } => true,
            Self::WithContext { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }
}

/// Result type alias for AbiQueue operations
pub type Result<T> = std::result::Result<T, AbiQueueError>;

impl From<std::io::Error> for AbiQueueError {
    fn from(err: std::io::Error) -> Self {
        AbiQueueError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for AbiQueueError {
    fn from(err: serde_json::Error) -> Self {
        AbiQueueError::ConfigError(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| AbiQueueError::io(path, e))
    }
}

//! Error types for the IndexHub build domain.
//!
//! [`BuildError`] is the error carried by a [`crate::BuildOutcome`]: the only
//! error a submitting caller or a broadcast observer ever sees. Port-level errors
//! ([`ExecutionError`], [`ConfigMergeError`], [`PublishError`]) are produced by
//! the infrastructure crates implementing the traits in [`crate::ports`] and are
//! folded into [`BuildError`] by the coordinator.
//!
//! Every error that can travel inside an outcome is `Clone`: one outcome is
//! delivered both to the requesting caller and to the broadcast stream.
//! Notification failures ([`PublishError`]) are deliberately *not* convertible
//! into [`BuildError`]; they are logged and dropped.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Outcome errors
// ---------------------------------------------------------------------------

/// Why a processed (or never-processed) build request did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// The build tool did not exit before the per-request deadline.
    ///
    /// The subprocess was terminated. This is never retried automatically.
    #[error("build tool execution timeout")]
    ExecutionTimeout(#[source] DeadlineExceeded),

    /// The build tool could not be started, exited non-zero, or was stopped by
    /// a shutdown.
    #[error("build tool execution failed")]
    ExecutionFailure(#[source] ExecutionError),

    /// The configuration document could not be read, parsed, or rewritten.
    ///
    /// The build tool is not invoked when this occurs.
    #[error("configuration merge failed")]
    ConfigMergeFailure(#[source] ConfigMergeError),

    /// The request was superseded by a full rebuild, or the coordinator shut
    /// down before reaching it. Nothing was executed.
    #[error("build request discarded before execution")]
    Discarded,
}

impl BuildError {
    /// Returns `true` for [`BuildError::Discarded`].
    pub fn is_discarded(&self) -> bool {
        matches!(self, Self::Discarded)
    }

    /// Returns `true` for [`BuildError::ExecutionTimeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ExecutionTimeout(_))
    }
}

impl From<ExecutionError> for BuildError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::DeadlineExceeded(deadline) => Self::ExecutionTimeout(deadline),
            other => Self::ExecutionFailure(other),
        }
    }
}

impl From<ConfigMergeError> for BuildError {
    fn from(err: ConfigMergeError) -> Self {
        Self::ConfigMergeFailure(err)
    }
}

// ---------------------------------------------------------------------------
// Executor errors
// ---------------------------------------------------------------------------

/// The deadline-exceeded signal raised when a build runs past its timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deadline exceeded after {timeout:?}")]
pub struct DeadlineExceeded {
    /// The per-request timeout that elapsed.
    pub timeout: Duration,
}

/// Failures reported by a [`crate::BuildExecutor`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The deadline elapsed before the build tool exited.
    #[error(transparent)]
    DeadlineExceeded(#[from] DeadlineExceeded),

    /// The build tool process could not be spawned.
    #[error("failed to start '{program}': {message}")]
    Spawn {
        /// The executable that was launched.
        program: String,
        /// The underlying OS error message.
        message: String,
    },

    /// The build tool exited unsuccessfully.
    ///
    /// `code` is `None` when the process was terminated by a signal.
    #[error("build tool exited with status {}", .code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    ExitStatus {
        /// The process exit code, if any.
        code: Option<i32>,
    },

    /// The process-wide shutdown fired and the build did not finish within the
    /// shutdown grace period.
    #[error("build cancelled by shutdown")]
    Cancelled,

    /// Waiting on the child process failed.
    #[error("build tool I/O error: {0}")]
    Io(String),
}

// ---------------------------------------------------------------------------
// Configuration merge errors
// ---------------------------------------------------------------------------

/// Failures reported by a [`crate::ConfigMerger`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigMergeError {
    /// The configuration document could not be read.
    #[error("failed to open config file {}: {message}", .path.display())]
    Read {
        /// Path of the configuration document.
        path: PathBuf,
        /// The underlying I/O error message.
        message: String,
    },

    /// The configuration document is not valid JSON.
    #[error("config file contains invalid JSON content: {0}")]
    InvalidJson(String),

    /// The configuration document is valid JSON but not an object.
    #[error("config document is not a JSON object")]
    NotAnObject,

    /// The `repositories` entry is present but not an array.
    #[error(r#"config entry "repositories" is not an array"#)]
    RepositoriesNotArray,

    /// A `repositories` element is not an object.
    #[error(r#"config entry "repositories[{0}]" is not an object"#)]
    RepositoryNotObject(usize),

    /// The `require` entry is present but not an object.
    #[error(r#"config entry "require" is not an object"#)]
    RequireNotObject,

    /// The merged document could not be encoded.
    #[error("failed to encode config file: {0}")]
    Encode(String),

    /// The merged document could not be written back.
    #[error("failed to write config file {}: {message}", .path.display())]
    Write {
        /// Path of the configuration document.
        path: PathBuf,
        /// The underlying I/O error message.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Notification errors
// ---------------------------------------------------------------------------

/// Failures reported by a [`crate::TopicPublisher`].
///
/// Only ever logged; never part of a build outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// The topic identifier cannot be used by this publisher.
    #[error("invalid topic '{topic}': {reason}")]
    InvalidTopic {
        /// The rejected topic identifier.
        topic: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The message could not be delivered.
    #[error("notification transport error: {0}")]
    Transport(String),

    /// The topic endpoint answered with a non-success status.
    #[error("notification rejected with status {status}")]
    Rejected {
        /// HTTP status code returned by the endpoint.
        status: u16,
    },

    /// The message could not be serialised.
    #[error("failed to encode notification: {0}")]
    Encode(String),
}

//! Errors raised by the coordinator's own API (as opposed to build outcomes).

use thiserror::Error;

/// A build request could not be enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// [`crate::Coordinator::close`] was called, or the command loop has stopped.
    #[error("build coordinator is closed")]
    Closed,
}

/// Startup-contract violations of [`crate::Coordinator::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    /// `run` was called more than once.
    #[error("build coordinator is already running")]
    AlreadyRunning,

    /// The inbound queue was closed before the command loop was started.
    #[error("build coordinator was closed before it was started")]
    ClosedBeforeStart,
}

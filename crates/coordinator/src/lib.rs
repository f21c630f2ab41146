//! IndexHub build coordinator.
//!
//! The single serialisation point between inbound trigger events and the
//! external package-index build tool. Callers submit requests through a cloned
//! [`Coordinator`] handle and await the returned [`ResultHandle`]; one command
//! loop, started with [`Coordinator::run`], processes them in arrival order:
//!
//! | Request | Processing |
//! |---------|------------|
//! | Full rebuild | Discard every request still queued, then build everything. |
//! | Partial update | Merge the repository into the configuration, then build that package (or everything when the descriptor has no name). |
//!
//! Every processed outcome is delivered to the submitter and to the
//! [`ResultStream`] returned by `run`. Lifecycle events are published through
//! the [`Notifier`] on a best-effort basis.
//!
//! ## Architectural Layer
//!
//! **Application.** The coordinator drives the [`domain::BuildExecutor`] and
//! [`domain::ConfigMerger`] ports; it knows nothing about subprocesses, files,
//! or HTTP.

pub mod config;
pub mod error;
pub mod notifications;

mod actor;
mod request;

pub use actor::Coordinator;
pub use config::{CoordinatorConfig, DEFAULT_BUILD_TIMEOUT, DEFAULT_QUEUE_CAPACITY};
pub use error::{CoordinatorError, SubmitError};
pub use notifications::{Notification, Notifier, PartialBuildStage};
pub use request::{ResultHandle, ResultStream};

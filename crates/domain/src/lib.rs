//! Core build domain for IndexHub.
//!
//! This crate contains every domain concept, newtype identifier, shared value
//! type, and error type used by the build coordinator and its collaborators.
//! Infrastructure crates implement the port traits defined here; they never add
//! domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`BuildId`, `PackageName`, `RepositoryUrl`, etc.) |
//! | [`types`] | Value types (`PackageDescriptor`, `BuildMode`, `BuildOutcome`, `Timestamp`) |
//! | [`errors`] | Outcome and port error types |
//! | [`ports`] | `BuildExecutor`, `ConfigMerger`, `TopicPublisher`, and `Deadline` |

pub mod errors;
pub mod identifiers;
pub mod ports;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::{BuildError, ConfigMergeError, DeadlineExceeded, ExecutionError, PublishError};
pub use identifiers::{BuildId, EmptyIdentifier, PackageName, RepositoryKind, RepositoryUrl, TopicId};
pub use ports::{BuildExecutor, ConfigMerger, Deadline, TopicPublisher};
pub use types::{BuildMode, BuildOutcome, PackageDescriptor, Timestamp};

//! Port traits implemented by the infrastructure crates.
//!
//! The coordinator depends only on these traits. `executor` implements
//! [`BuildExecutor`], `repoconfig` implements [`ConfigMerger`], and `notifier`
//! implements [`TopicPublisher`]. Tests substitute in-memory fakes.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    BuildMode, ConfigMergeError, DeadlineExceeded, ExecutionError, PackageDescriptor,
    PublishError, TopicId,
};

/// Stand-in for an unbounded deadline: roughly 30 years from now.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The time budget of one build tool invocation.
///
/// Combines the fixed per-request timeout with the process-wide cancellation
/// signal; whichever fires first bounds the invocation.
#[derive(Debug, Clone)]
pub struct Deadline {
    /// Point in time at which the invocation must be terminated.
    pub expires_at: Instant,
    /// The per-request timeout the deadline was derived from.
    pub timeout: Duration,
    /// Process-wide shutdown signal.
    pub cancel: CancellationToken,
}

impl Deadline {
    /// A deadline `timeout` from now, bounded by `cancel`.
    ///
    /// Timeouts too large to represent as an [`Instant`] are clamped to a
    /// point decades away.
    pub fn after(timeout: Duration, cancel: CancellationToken) -> Self {
        let now = Instant::now();
        let expires_at = now
            .checked_add(timeout)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        Self {
            expires_at,
            timeout,
            cancel,
        }
    }

    /// Returns `true` once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Time left before the deadline; zero once expired.
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// The deadline-exceeded signal for this deadline.
    pub fn exceeded(&self) -> DeadlineExceeded {
        DeadlineExceeded {
            timeout: self.timeout,
        }
    }
}

/// Runs the external build tool.
///
/// Implementations must terminate the invocation when `deadline` expires and
/// report that as [`ExecutionError::DeadlineExceeded`], distinct from a
/// non-zero exit.
#[async_trait]
pub trait BuildExecutor: Send + Sync {
    /// Runs one build in `mode`, returning once the tool has exited.
    async fn execute(&self, mode: &BuildMode, deadline: Deadline) -> Result<(), ExecutionError>;
}

/// Merges package descriptors into the configuration document on disk.
///
/// Must be idempotent: merging the same descriptors twice produces the same
/// document.
#[async_trait]
pub trait ConfigMerger: Send + Sync {
    /// Merges `updates` into the document at `path` and writes it back.
    async fn merge(&self, path: &Path, updates: &[PackageDescriptor])
        -> Result<(), ConfigMergeError>;
}

/// Publishes a JSON message to a notification topic.
///
/// Best-effort only: callers log failures and carry on.
#[async_trait]
pub trait TopicPublisher: Send + Sync {
    /// Publishes `message` to `topic`.
    async fn publish(&self, topic: &TopicId, message: &str) -> Result<(), PublishError>;
}

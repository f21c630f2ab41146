//! Coordinator configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default per-build timeout (20 minutes).
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Default capacity of the inbound request queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Settings consumed by the command loop.
///
/// Supplied by the composition root; nothing here is parsed by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// The configuration document partial updates are merged into.
    pub config_path: PathBuf,

    /// Upper bound on one build tool invocation.
    pub build_timeout: Duration,

    /// Number of requests that may wait in the inbound queue before
    /// submitters are back-pressured.
    pub queue_capacity: usize,

    /// Number of outcomes buffered for the broadcast stream before the command
    /// loop waits for the observer.
    pub stream_capacity: usize,
}

impl CoordinatorConfig {
    /// Configuration with default timeout and capacities.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            build_timeout: DEFAULT_BUILD_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            stream_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Sets the per-build timeout.
    #[must_use]
    pub fn with_build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = timeout;
        self
    }

    /// Sets the inbound queue capacity. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

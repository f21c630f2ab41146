//! Notification adapter: shapes lifecycle events into topic messages.
//!
//! Delivery is best-effort. [`Notifier::send`] reports failures to its caller,
//! which logs them and carries on; no coordinator operation fails because a
//! notification could not be delivered.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use domain::{PackageDescriptor, PublishError, Timestamp, TopicId, TopicPublisher};
use serde::Serialize;

/// Message sent when the command loop starts.
pub const SERVICE_START_MESSAGE: &str = "indexhub service start";

/// Message sent after the command loop has stopped.
pub const SERVICE_EXIT_MESSAGE: &str = "indexhub service exit";

/// Progress marker of a partial build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialBuildStage {
    /// Sent before the configuration merge begins.
    Start,
    /// Sent after the build tool exited successfully.
    Completed,
    /// Sent when the merge or the build failed; paired with an `error` field.
    Error,
}

/// A lifecycle event published to the notification topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Notification {
    /// The command loop started or stopped.
    #[serde(rename = "service")]
    Service {
        /// [`SERVICE_START_MESSAGE`] or [`SERVICE_EXIT_MESSAGE`].
        msg: String,
        /// Unix time in seconds.
        time: i64,
    },

    /// Progress of one partial update.
    #[serde(rename = "partialBuild")]
    PartialBuild {
        /// The repository being merged and built.
        package: PackageDescriptor,
        /// How far the update has got.
        msg: PartialBuildStage,
        /// Failure detail with its source chain; present only on
        /// [`PartialBuildStage::Error`].
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Unix time in seconds.
        time: i64,
    },
}

impl Notification {
    /// Announces that the command loop is accepting work.
    pub fn service_started() -> Self {
        Self::service(SERVICE_START_MESSAGE)
    }

    /// Announces that the command loop has stopped and the stream is closed.
    pub fn service_stopped() -> Self {
        Self::service(SERVICE_EXIT_MESSAGE)
    }

    /// A partial update of `package` has been dequeued.
    pub fn partial_build_started(package: &PackageDescriptor) -> Self {
        Self::partial_build(package, PartialBuildStage::Start, None)
    }

    /// The partial update of `package` merged and built successfully.
    pub fn partial_build_completed(package: &PackageDescriptor) -> Self {
        Self::partial_build(package, PartialBuildStage::Completed, None)
    }

    /// A failed partial build; `error` is rendered with its full source chain.
    pub fn partial_build_failed(package: &PackageDescriptor, error: &dyn StdError) -> Self {
        Self::partial_build(
            package,
            PartialBuildStage::Error,
            Some(error_chain(error)),
        )
    }

    fn service(msg: &str) -> Self {
        Self::Service {
            msg: msg.to_string(),
            time: Timestamp::now().unix_seconds(),
        }
    }

    fn partial_build(
        package: &PackageDescriptor,
        stage: PartialBuildStage,
        error: Option<String>,
    ) -> Self {
        Self::PartialBuild {
            package: package.clone(),
            msg: stage,
            error,
            time: Timestamp::now().unix_seconds(),
        }
    }
}

/// Renders an error and its sources as `outer: inner: root`.
pub fn error_chain(error: &dyn StdError) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

/// Publishes [`Notification`]s to a topic, or does nothing when no topic is
/// configured.
#[derive(Clone, Default)]
pub struct Notifier {
    target: Option<(TopicId, Arc<dyn TopicPublisher>)>,
}

impl Notifier {
    /// A notifier that accepts and drops every message.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Publishes to `topic` through `publisher`.
    pub fn new(topic: TopicId, publisher: Arc<dyn TopicPublisher>) -> Self {
        Self {
            target: Some((topic, publisher)),
        }
    }

    /// Returns `true` when a topic is configured.
    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Encodes and publishes one message.
    pub async fn send(&self, notification: &Notification) -> Result<(), PublishError> {
        let Some((topic, publisher)) = &self.target else {
            return Ok(());
        };
        let body =
            serde_json::to_string(notification).map_err(|e| PublishError::Encode(e.to_string()))?;
        publisher.publish(topic, &body).await
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("topic", &self.target.as_ref().map(|(topic, _)| topic))
            .finish()
    }
}

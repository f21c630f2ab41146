//! IndexHub notification transports.
//!
//! Implements the [`domain::TopicPublisher`] trait twice, and picks one from
//! the shape of the topic identifier:
//!
//! | Topic | Transport |
//! |-------|-----------|
//! | `arn:aws:sns:<region>:<account>:<name>` | [`SnsTopicPublisher`]: SNS `Publish` through the AWS SDK |
//! | `http://…` or `https://…` | [`HttpTopicPublisher`]: POST of the JSON message body |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Transport and response classification live here.
//! Message shaping lives in the coordinator's notification adapter; delivery is
//! best-effort and callers only log the [`domain::PublishError`]s returned here.

mod http;
mod sns;

use std::sync::Arc;
use std::time::Duration;

use domain::{PublishError, TopicId, TopicPublisher};
use reqwest::Url;

pub use http::{topic_url, HttpTopicPublisher};
pub use sns::{is_sns_topic_arn, SnsTopicPublisher};

/// Default upper bound on one publish call.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// How messages for a given topic are delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicTransport {
    /// AWS SNS, addressed by topic ARN.
    Sns,
    /// HTTP POST to this endpoint.
    Http(Url),
}

impl TopicTransport {
    /// Selects the transport for `topic`. Anything that is neither an SNS
    /// topic ARN nor an HTTP(S) URL is rejected.
    pub fn for_topic(topic: &TopicId) -> Result<Self, PublishError> {
        if is_sns_topic_arn(topic) {
            return Ok(Self::Sns);
        }
        topic_url(topic).map(Self::Http)
    }

    /// Short name for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sns => "sns",
            Self::Http(_) => "http",
        }
    }
}

/// Builds the publisher for `topic`, each publish bounded by `timeout`.
pub async fn publisher_for(
    topic: &TopicId,
    timeout: Duration,
) -> Result<Arc<dyn TopicPublisher>, PublishError> {
    let publisher: Arc<dyn TopicPublisher> = match TopicTransport::for_topic(topic)? {
        TopicTransport::Sns => Arc::new(SnsTopicPublisher::from_environment(timeout).await),
        TopicTransport::Http(_) => Arc::new(HttpTopicPublisher::new(timeout)?),
    };
    Ok(publisher)
}

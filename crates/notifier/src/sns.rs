//! AWS SNS topics, addressed by topic ARN.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_sns::error::DisplayErrorContext;
use aws_sdk_sns::Client;
use domain::{PublishError, TopicId, TopicPublisher};
use tracing::debug;

/// [`TopicPublisher`] that publishes to an SNS topic.
///
/// Credentials and region come from the standard AWS provider chain
/// (environment, shared config and credentials files, container or instance
/// metadata).
#[derive(Debug, Clone)]
pub struct SnsTopicPublisher {
    client: Client,
}

impl SnsTopicPublisher {
    /// Creates a publisher from the ambient AWS configuration. Each publish
    /// call, retries included, is bounded by `timeout`.
    pub async fn from_environment(timeout: Duration) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(timeout)
                    .build(),
            )
            .load()
            .await;
        Self::new(Client::new(&config))
    }

    /// Creates a publisher over an already configured client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Returns `true` when `topic` has the shape of an SNS topic ARN:
/// `arn:<partition>:sns:<region>:<account>:<name>`.
pub fn is_sns_topic_arn(topic: &TopicId) -> bool {
    let parts: Vec<&str> = topic.as_str().split(':').collect();
    matches!(
        parts.as_slice(),
        ["arn", partition, "sns", region, account, name]
            if partition.starts_with("aws")
                && !region.is_empty()
                && !account.is_empty()
                && !name.is_empty()
    )
}

#[async_trait]
impl TopicPublisher for SnsTopicPublisher {
    async fn publish(&self, topic: &TopicId, message: &str) -> Result<(), PublishError> {
        if !is_sns_topic_arn(topic) {
            return Err(PublishError::InvalidTopic {
                topic: topic.to_string(),
                reason: "not an SNS topic ARN".to_string(),
            });
        }

        let output = self
            .client
            .publish()
            .topic_arn(topic.as_str())
            .message(message)
            .send()
            .await
            .map_err(|e| PublishError::Transport(DisplayErrorContext(&e).to_string()))?;

        debug!(
            %topic,
            message_id = output.message_id().unwrap_or("-"),
            "notification published"
        );
        Ok(())
    }
}

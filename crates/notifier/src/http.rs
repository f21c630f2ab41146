//! Webhook-style topics: POST the JSON message to the topic URL.

use std::time::Duration;

use async_trait::async_trait;
use domain::{PublishError, TopicId, TopicPublisher};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use tracing::debug;

/// [`TopicPublisher`] that POSTs messages to the topic URL.
#[derive(Debug, Clone)]
pub struct HttpTopicPublisher {
    client: Client,
}

impl HttpTopicPublisher {
    /// Creates a publisher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("indexhub/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PublishError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

/// Parses a topic identifier as an HTTP(S) endpoint.
pub fn topic_url(topic: &TopicId) -> Result<Url, PublishError> {
    let invalid = |reason: String| PublishError::InvalidTopic {
        topic: topic.to_string(),
        reason,
    };

    let url = Url::parse(topic.as_str()).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}

#[async_trait]
impl TopicPublisher for HttpTopicPublisher {
    async fn publish(&self, topic: &TopicId, message: &str) -> Result<(), PublishError> {
        let url = topic_url(topic)?;

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(message.to_string())
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Rejected {
                status: status.as_u16(),
            });
        }

        debug!(%topic, status = status.as_u16(), "notification published");
        Ok(())
    }
}

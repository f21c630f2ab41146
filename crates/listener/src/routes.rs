//! Request handlers.
//!
//! Trigger endpoints acknowledge immediately; the build request is submitted
//! from a detached task that logs the eventual outcome.

use std::future::Future;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use coordinator::{ResultHandle, SubmitError};
use domain::{PackageDescriptor, RepositoryKind, RepositoryUrl};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn, Instrument};

use crate::config::ListenerState;

/// Query parameters of the GitLab webhook: the package the pushed repository
/// provides, and the version constraint to require it at.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// The parts of a GitLab push event payload the listener reads.
#[derive(Debug, Default, Deserialize)]
struct GitlabPush {
    #[serde(default)]
    repository: GitlabRepository,
}

#[derive(Debug, Default, Deserialize)]
struct GitlabRepository {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Serialize)]
pub struct Accepted {
    pub accepted: bool,
}

/// `POST /webhook/gitlab`. Always answers `200 "OK"` so GitLab never retries
/// or disables the hook.
pub async fn gitlab_webhook(
    State(state): State<ListenerState>,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> Json<&'static str> {
    let push: GitlabPush = match serde_json::from_slice(&body) {
        Ok(push) => push,
        Err(err) => {
            warn!(error = %err, "GitLab webhook content is malformed; ignoring");
            return Json("OK");
        }
    };

    let Some(url) = RepositoryUrl::new(push.repository.url) else {
        debug!(
            repository = %push.repository.name,
            "repository URL missing from webhook payload; ignoring"
        );
        return Json("OK");
    };

    let descriptor = PackageDescriptor::new(url, RepositoryKind::vcs())
        .with_name(query.name.unwrap_or_default())
        .with_version(query.version.unwrap_or_default());
    info!(
        url = %descriptor.url,
        name = ?descriptor.name.as_ref().map(|n| n.as_str()),
        "repository push received"
    );

    let coordinator = state.coordinator.clone();
    track("partial_update", async move {
        coordinator.submit_partial_update(descriptor).await
    });
    Json("OK")
}

/// `POST /rebuild`: schedules a full rebuild.
pub async fn rebuild(State(state): State<ListenerState>) -> (StatusCode, Json<Accepted>) {
    info!("full rebuild requested");
    let coordinator = state.coordinator.clone();
    track("full_rebuild", async move { coordinator.submit_rebuild().await });
    (StatusCode::ACCEPTED, Json(Accepted { accepted: true }))
}

/// `GET /health`.
pub async fn health() -> &'static str {
    "OK"
}

/// Submits a request from a detached task and logs how it ends.
fn track<F>(kind: &'static str, submission: F)
where
    F: Future<Output = Result<ResultHandle, SubmitError>> + Send + 'static,
{
    let span = tracing::Span::current();
    tokio::spawn(
        async move {
            let handle = match submission.await {
                Ok(handle) => handle,
                Err(err) => {
                    warn!(kind, error = %err, "build request rejected");
                    return;
                }
            };
            let id = handle.id();
            let outcome = handle.outcome().await;
            match &outcome.error {
                None => debug!(kind, %id, "build request completed"),
                Some(err) if err.is_discarded() => {
                    debug!(kind, %id, "build request discarded")
                }
                Some(err) => error!(kind, %id, error = %err, "build request failed"),
            }
        }
        .instrument(span),
    );
}

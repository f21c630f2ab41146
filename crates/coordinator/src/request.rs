//! Requests carried by the inbound queue and the handles returned to callers.

use domain::{BuildId, BuildOutcome, PackageDescriptor};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// What a queued request asks the coordinator to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RequestKind {
    /// Run the build tool over the whole configuration.
    FullRebuild,

    /// Merge one repository into the configuration, then build it.
    PartialUpdate(PackageDescriptor),
}

impl RequestKind {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::FullRebuild => "full_rebuild",
            Self::PartialUpdate(_) => "partial_update",
        }
    }
}

/// One-shot completion slot embedded in every request.
///
/// Consuming `self` on resolution means a sink can be completed at most once.
/// Dropping it unresolved is the discard signal observed by [`ResultHandle`].
#[derive(Debug)]
pub(crate) struct ResultSink {
    id: BuildId,
    tx: oneshot::Sender<BuildOutcome>,
}

impl ResultSink {
    pub(crate) fn resolve(self, outcome: BuildOutcome) {
        if self.tx.send(outcome).is_err() {
            debug!(id = %self.id, "result handle dropped before resolution");
        }
    }

    pub(crate) fn discard(self) {
        debug!(id = %self.id, "discarding queued build request");
    }
}

/// A queued build request.
#[derive(Debug)]
pub(crate) struct BuildRequest {
    pub(crate) id: BuildId,
    pub(crate) kind: RequestKind,
    pub(crate) sink: ResultSink,
}

impl BuildRequest {
    /// Creates a request and the handle its submitter will await.
    pub(crate) fn new(kind: RequestKind) -> (Self, ResultHandle) {
        let id = BuildId::new_random();
        let (tx, rx) = oneshot::channel();
        let request = Self {
            id,
            kind,
            sink: ResultSink { id, tx },
        };
        (request, ResultHandle { id, rx })
    }
}

/// The submitter's view of one accepted request.
///
/// Resolves exactly once. A request that was superseded by a full rebuild, or
/// still queued when the coordinator stopped, resolves to a
/// [`domain::BuildError::Discarded`] outcome.
#[derive(Debug)]
pub struct ResultHandle {
    id: BuildId,
    rx: oneshot::Receiver<BuildOutcome>,
}

impl ResultHandle {
    /// The identifier assigned to the request at submission.
    pub fn id(&self) -> BuildId {
        self.id
    }

    /// Waits for the request's outcome.
    pub async fn outcome(self) -> BuildOutcome {
        let id = self.id;
        self.rx
            .await
            .unwrap_or_else(|_| BuildOutcome::discarded(id))
    }
}

/// Every outcome the coordinator produces, in processing order.
///
/// Ends (`next` returns `None`) once the command loop has exited. Requests
/// discarded without execution do not appear here; only their handles see
/// the discard.
#[derive(Debug)]
pub struct ResultStream {
    rx: mpsc::Receiver<BuildOutcome>,
}

impl ResultStream {
    pub(crate) fn new(rx: mpsc::Receiver<BuildOutcome>) -> Self {
        Self { rx }
    }

    /// Receives the next outcome, or `None` once the coordinator has stopped.
    pub async fn next(&mut self) -> Option<BuildOutcome> {
        self.rx.recv().await
    }
}

/// Removes every request currently queued and signals each one as discarded.
///
/// Returns the number of requests removed.
pub(crate) fn discard_pending(inbox: &mut mpsc::Receiver<BuildRequest>) -> usize {
    let mut discarded = 0;
    while let Ok(request) = inbox.try_recv() {
        request.sink.discard();
        discarded += 1;
    }
    discarded
}

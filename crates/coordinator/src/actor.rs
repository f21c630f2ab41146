//! The build coordinator: a single command loop serialising every build.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use domain::{
    BuildError, BuildExecutor, BuildMode, BuildOutcome, ConfigMerger, Deadline, ExecutionError,
    PackageDescriptor,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, SubmitError};
use crate::notifications::{error_chain, Notification, Notifier};
use crate::request::{discard_pending, BuildRequest, RequestKind, ResultHandle, ResultStream};

/// Handle to the build coordinator.
///
/// Cheap to clone; every clone submits into the same inbound queue. The
/// command loop is started once with [`Coordinator::run`] and executes at most
/// one build at a time, in arrival order.
#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
}

struct Shared {
    /// `None` once [`Coordinator::close`] has been called.
    sender: Mutex<Option<mpsc::Sender<BuildRequest>>>,
    /// `None` once the command loop has been started.
    pending: Mutex<Option<(mpsc::Receiver<BuildRequest>, Worker)>>,
    stream_capacity: usize,
}

impl Coordinator {
    /// Creates a coordinator. Requests may be submitted before it is started;
    /// they wait in the queue (subject to its capacity).
    pub fn new(
        config: CoordinatorConfig,
        executor: Arc<dyn BuildExecutor>,
        merger: Arc<dyn ConfigMerger>,
        notifier: Notifier,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let stream_capacity = config.stream_capacity.max(1);
        let worker = Worker {
            config,
            executor,
            merger,
            notifier,
        };
        Self {
            shared: Arc::new(Shared {
                sender: Mutex::new(Some(sender)),
                pending: Mutex::new(Some((receiver, worker))),
                stream_capacity,
            }),
        }
    }

    /// Enqueues a full rebuild, waiting for queue capacity if necessary.
    pub async fn submit_rebuild(&self) -> Result<ResultHandle, SubmitError> {
        self.submit(RequestKind::FullRebuild).await
    }

    /// Enqueues a merge-then-build of one repository, waiting for queue
    /// capacity if necessary.
    pub async fn submit_partial_update(
        &self,
        descriptor: PackageDescriptor,
    ) -> Result<ResultHandle, SubmitError> {
        self.submit(RequestKind::PartialUpdate(descriptor)).await
    }

    async fn submit(&self, kind: RequestKind) -> Result<ResultHandle, SubmitError> {
        let sender = lock(&self.shared.sender)
            .clone()
            .ok_or(SubmitError::Closed)?;
        let (request, handle) = BuildRequest::new(kind);
        debug!(id = %request.id, kind = request.kind.label(), "submitting build request");
        sender
            .send(request)
            .await
            .map_err(|_| SubmitError::Closed)?;
        Ok(handle)
    }

    /// Starts the command loop on the current tokio runtime.
    ///
    /// The loop stops when `cancel` fires, or when the coordinator has been
    /// closed and every queued request has been processed. Requests still
    /// queued at that point are discarded. The returned stream ends after the
    /// loop has stopped.
    pub fn run(&self, cancel: CancellationToken) -> Result<ResultStream, CoordinatorError> {
        if lock(&self.shared.sender).is_none() {
            return Err(CoordinatorError::ClosedBeforeStart);
        }
        let (inbox, worker) = lock(&self.shared.pending)
            .take()
            .ok_or(CoordinatorError::AlreadyRunning)?;

        let (results, stream) = mpsc::channel(self.shared.stream_capacity);
        tokio::spawn(
            worker
                .run(inbox, results, cancel)
                .instrument(info_span!("coordinator")),
        );
        Ok(ResultStream::new(stream))
    }

    /// Stops accepting requests. Already queued requests are still processed.
    ///
    /// Safe to call any number of times.
    pub fn close(&self) {
        if lock(&self.shared.sender).take().is_some() {
            debug!("build coordinator closed for new requests");
        }
    }

    /// Returns `true` once [`Coordinator::close`] has been called.
    pub fn is_closed(&self) -> bool {
        lock(&self.shared.sender).is_none()
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("closed", &self.is_closed())
            .field("started", &lock(&self.shared.pending).is_none())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State owned by the command loop.
struct Worker {
    config: CoordinatorConfig,
    executor: Arc<dyn BuildExecutor>,
    merger: Arc<dyn ConfigMerger>,
    notifier: Notifier,
}

impl Worker {
    async fn run(
        self,
        mut inbox: mpsc::Receiver<BuildRequest>,
        results: mpsc::Sender<BuildOutcome>,
        cancel: CancellationToken,
    ) {
        info!(
            config = %self.config.config_path.display(),
            timeout = ?self.config.build_timeout,
            "build coordinator started"
        );
        self.notify(Notification::service_started()).await;

        loop {
            let request = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("cancellation requested");
                    break;
                }
                request = inbox.recv() => match request {
                    Some(request) => request,
                    None => {
                        debug!("inbound queue closed and drained");
                        break;
                    }
                },
            };

            let outcome = self.process(request, &mut inbox, &cancel).await;
            if results.send(outcome).await.is_err() {
                debug!("result stream dropped by its observer");
            }
        }

        inbox.close();
        let discarded = discard_pending(&mut inbox);
        drop(results);
        info!(discarded, "build coordinator stopped");
        self.notify(Notification::service_stopped()).await;
    }

    /// Handles one request and resolves its sink. Returns the outcome for the
    /// broadcast stream.
    async fn process(
        &self,
        request: BuildRequest,
        inbox: &mut mpsc::Receiver<BuildRequest>,
        cancel: &CancellationToken,
    ) -> BuildOutcome {
        let BuildRequest { id, kind, sink } = request;
        let span = info_span!("build", %id, kind = kind.label());

        let result = async {
            match kind {
                RequestKind::FullRebuild => self.full_rebuild(inbox, cancel).await,
                RequestKind::PartialUpdate(descriptor) => {
                    self.partial_update(&descriptor, cancel).await
                }
            }
        }
        .instrument(span.clone())
        .await;

        span.in_scope(|| match &result {
            Ok(()) => info!("build succeeded"),
            Err(err) => error!(error = %error_chain(err), "build failed"),
        });

        let outcome = BuildOutcome::from_result(id, result);
        sink.resolve(outcome.clone());
        outcome
    }

    async fn full_rebuild(
        &self,
        inbox: &mut mpsc::Receiver<BuildRequest>,
        cancel: &CancellationToken,
    ) -> Result<(), BuildError> {
        let discarded = discard_pending(inbox);
        if discarded > 0 {
            info!(discarded, "discarded requests superseded by full rebuild");
        }
        self.execute(&BuildMode::Full, cancel).await
    }

    async fn partial_update(
        &self,
        descriptor: &PackageDescriptor,
        cancel: &CancellationToken,
    ) -> Result<(), BuildError> {
        self.notify(Notification::partial_build_started(descriptor))
            .await;

        let result = self.merge_then_build(descriptor, cancel).await;

        let notification = match &result {
            Ok(()) => Notification::partial_build_completed(descriptor),
            Err(err) => Notification::partial_build_failed(descriptor, err),
        };
        self.notify(notification).await;
        result
    }

    async fn merge_then_build(
        &self,
        descriptor: &PackageDescriptor,
        cancel: &CancellationToken,
    ) -> Result<(), BuildError> {
        debug!(url = %descriptor.url, kind = %descriptor.kind, "merging repository into configuration");
        self.merger
            .merge(&self.config.config_path, std::slice::from_ref(descriptor))
            .await?;
        if cancel.is_cancelled() {
            debug!("shutdown requested during merge; skipping build");
            return Err(ExecutionError::Cancelled.into());
        }
        self.execute(&descriptor.build_mode(), cancel).await
    }

    async fn execute(&self, mode: &BuildMode, cancel: &CancellationToken) -> Result<(), BuildError> {
        let deadline = Deadline::after(self.config.build_timeout, cancel.clone());
        info!(%mode, "running build tool");
        self.executor
            .execute(mode, deadline)
            .await
            .map_err(BuildError::from)
    }

    async fn notify(&self, notification: Notification) {
        if let Err(err) = self.notifier.send(&notification).await {
            warn!(error = %err, "notification failed");
        }
    }
}

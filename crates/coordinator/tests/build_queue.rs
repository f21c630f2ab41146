//! Behavioural tests of the coordinator's command loop against fake ports.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use coordinator::{Coordinator, CoordinatorConfig, Notifier, ResultHandle, ResultStream};
use domain::{
    BuildError, BuildExecutor, BuildMode, BuildOutcome, ConfigMergeError, ConfigMerger, Deadline,
    ExecutionError, PackageDescriptor, PackageName, PublishError, RepositoryKind, RepositoryUrl,
    TopicId, TopicPublisher,
};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
enum Behaviour {
    #[default]
    Succeed,
    Fail,
    WaitForDeadline,
}

#[derive(Default)]
struct FakeExecutor {
    calls: Mutex<Vec<BuildMode>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
    delay: Duration,
    behaviour: Behaviour,
}

impl FakeExecutor {
    fn calls(&self) -> Vec<BuildMode> {
        self.calls.lock().unwrap().clone()
    }

    async fn run(&self, deadline: Deadline) -> Result<(), ExecutionError> {
        if let Some(gate) = &self.gate {
            tokio::select! {
                permit = gate.acquire() => permit.expect("gate open").forget(),
                () = deadline.cancel.cancelled() => return Err(ExecutionError::Cancelled),
            }
        }
        tokio::time::sleep(self.delay).await;
        match self.behaviour {
            Behaviour::Succeed => Ok(()),
            Behaviour::Fail => Err(ExecutionError::ExitStatus { code: Some(1) }),
            Behaviour::WaitForDeadline => {
                tokio::time::sleep(deadline.remaining()).await;
                Err(deadline.exceeded().into())
            }
        }
    }
}

#[async_trait]
impl BuildExecutor for FakeExecutor {
    async fn execute(&self, mode: &BuildMode, deadline: Deadline) -> Result<(), ExecutionError> {
        self.calls.lock().unwrap().push(mode.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let result = self.run(deadline).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[derive(Default)]
struct FakeMerger {
    calls: Mutex<Vec<(PathBuf, Vec<PackageDescriptor>)>>,
    fail: bool,
    /// Fired from inside the merge, simulating a shutdown that lands mid-merge.
    cancel_during_merge: Mutex<Option<CancellationToken>>,
}

#[async_trait]
impl ConfigMerger for FakeMerger {
    async fn merge(
        &self,
        path: &Path,
        updates: &[PackageDescriptor],
    ) -> Result<(), ConfigMergeError> {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_path_buf(), updates.to_vec()));
        if let Some(cancel) = self.cancel_during_merge.lock().unwrap().take() {
            cancel.cancel();
        }
        if self.fail {
            Err(ConfigMergeError::InvalidJson("expected value at line 1 column 1".into()))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct RecordingPublisher {
    messages: Mutex<Vec<Value>>,
    fail: bool,
}

impl RecordingPublisher {
    fn messages(&self) -> Vec<Value> {
        self.messages.lock().unwrap().clone()
    }

    fn summary(&self) -> Vec<String> {
        self.messages()
            .iter()
            .map(|m| format!("{}:{}", m["type"].as_str().unwrap(), m["msg"].as_str().unwrap()))
            .collect()
    }
}

#[async_trait]
impl TopicPublisher for RecordingPublisher {
    async fn publish(&self, _topic: &TopicId, message: &str) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError::Transport("connection refused".into()));
        }
        self.messages
            .lock()
            .unwrap()
            .push(serde_json::from_str(message).expect("notification is JSON"));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    coordinator: Coordinator,
    executor: Arc<FakeExecutor>,
    merger: Arc<FakeMerger>,
    publisher: Arc<RecordingPublisher>,
    cancel: CancellationToken,
    stream: ResultStream,
}

fn start(executor: FakeExecutor, merger: FakeMerger, publisher: RecordingPublisher) -> Harness {
    start_with(
        CoordinatorConfig::new("satis.json"),
        executor,
        merger,
        publisher,
    )
}

fn start_with(
    config: CoordinatorConfig,
    executor: FakeExecutor,
    merger: FakeMerger,
    publisher: RecordingPublisher,
) -> Harness {
    let executor = Arc::new(executor);
    let merger = Arc::new(merger);
    let publisher = Arc::new(publisher);
    let notifier = Notifier::new(
        TopicId::new("https://hooks.example.com/builds").unwrap(),
        publisher.clone(),
    );
    let coordinator = Coordinator::new(config, executor.clone(), merger.clone(), notifier);
    let cancel = CancellationToken::new();
    let stream = coordinator.run(cancel.clone()).expect("first run");
    Harness {
        coordinator,
        executor,
        merger,
        publisher,
        cancel,
        stream,
    }
}

fn gated() -> (FakeExecutor, Arc<Semaphore>) {
    let gate = Arc::new(Semaphore::new(0));
    let executor = FakeExecutor {
        gate: Some(gate.clone()),
        ..FakeExecutor::default()
    };
    (executor, gate)
}

fn descriptor(name: &str) -> PackageDescriptor {
    PackageDescriptor::new(
        RepositoryUrl::new(format!("https://gitlab.example.com/{name}.git")).unwrap(),
        RepositoryKind::new("vcs").unwrap(),
    )
    .with_name(name)
    .with_version("dev-master")
}

fn scoped(name: &str) -> BuildMode {
    BuildMode::Scoped(PackageName::new(name).unwrap())
}

async fn outcome(handle: ResultHandle) -> BuildOutcome {
    tokio::time::timeout(WAIT, handle.outcome())
        .await
        .expect("outcome within timeout")
}

async fn next(stream: &mut ResultStream) -> Option<BuildOutcome> {
    tokio::time::timeout(WAIT, stream.next())
        .await
        .expect("stream progress within timeout")
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition within timeout");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn partial_update_merges_then_builds_the_package() {
    let mut h = start(
        FakeExecutor::default(),
        FakeMerger::default(),
        RecordingPublisher::default(),
    );

    let handle = h
        .coordinator
        .submit_partial_update(descriptor("test/pkg"))
        .await
        .unwrap();
    let id = handle.id();
    let result = outcome(handle).await;

    assert_eq!(result, BuildOutcome::success(id));
    assert_eq!(next(&mut h.stream).await, Some(result));
    assert_eq!(h.executor.calls(), vec![scoped("test/pkg")]);

    let merges = h.merger.calls.lock().unwrap().clone();
    assert_eq!(merges.len(), 1);
    assert_eq!(merges[0].0, PathBuf::from("satis.json"));
    assert_eq!(merges[0].1, vec![descriptor("test/pkg")]);
}

#[tokio::test]
async fn nameless_partial_update_falls_back_to_a_full_build() {
    let h = start(
        FakeExecutor::default(),
        FakeMerger::default(),
        RecordingPublisher::default(),
    );
    let nameless = PackageDescriptor::new(
        RepositoryUrl::new("https://gitlab.example.com/anon.git").unwrap(),
        RepositoryKind::new("vcs").unwrap(),
    )
    .with_name("");

    let handle = h.coordinator.submit_partial_update(nameless).await.unwrap();

    assert!(outcome(handle).await.succeeded());
    assert_eq!(h.executor.calls(), vec![BuildMode::Full]);
}

#[tokio::test]
async fn full_rebuild_runs_without_merging() {
    let mut h = start(
        FakeExecutor::default(),
        FakeMerger::default(),
        RecordingPublisher::default(),
    );

    let handle = h.coordinator.submit_rebuild().await.unwrap();
    let result = outcome(handle).await;

    assert!(result.succeeded());
    assert_eq!(next(&mut h.stream).await, Some(result));
    assert_eq!(h.executor.calls(), vec![BuildMode::Full]);
    assert!(h.merger.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn full_rebuild_discards_everything_queued_behind_it() {
    let (executor, gate) = gated();
    let mut h = start(executor, FakeMerger::default(), RecordingPublisher::default());

    // The first request holds the loop inside the executor while the rest queue up.
    let first = h
        .coordinator
        .submit_partial_update(descriptor("a/first"))
        .await
        .unwrap();
    let rebuild = h.coordinator.submit_rebuild().await.unwrap();
    let queued = vec![
        h.coordinator
            .submit_partial_update(descriptor("b/second"))
            .await
            .unwrap(),
        h.coordinator.submit_rebuild().await.unwrap(),
        h.coordinator
            .submit_partial_update(descriptor("c/third"))
            .await
            .unwrap(),
    ];
    gate.add_permits(10);

    let first = outcome(first).await;
    let rebuild = outcome(rebuild).await;
    assert!(first.succeeded());
    assert!(rebuild.succeeded());
    for handle in queued {
        let id = handle.id();
        assert_eq!(outcome(handle).await, BuildOutcome::discarded(id));
    }

    assert_eq!(h.executor.calls(), vec![scoped("a/first"), BuildMode::Full]);
    assert_eq!(next(&mut h.stream).await, Some(first));
    assert_eq!(next(&mut h.stream).await, Some(rebuild));
}

#[tokio::test]
async fn partial_updates_are_processed_in_arrival_order() {
    let (executor, gate) = gated();
    let h = start(executor, FakeMerger::default(), RecordingPublisher::default());

    let mut handles = Vec::new();
    for name in ["a/one", "b/two", "c/three"] {
        handles.push(
            h.coordinator
                .submit_partial_update(descriptor(name))
                .await
                .unwrap(),
        );
    }
    gate.add_permits(10);

    for handle in handles {
        assert!(outcome(handle).await.succeeded());
    }
    assert_eq!(
        h.executor.calls(),
        vec![scoped("a/one"), scoped("b/two"), scoped("c/three")]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn at_most_one_build_runs_at_a_time() {
    let executor = FakeExecutor {
        delay: Duration::from_millis(10),
        ..FakeExecutor::default()
    };
    let h = start(executor, FakeMerger::default(), RecordingPublisher::default());

    let mut submitters = Vec::new();
    for i in 0..10 {
        let coordinator = h.coordinator.clone();
        submitters.push(tokio::spawn(async move {
            let handle = coordinator
                .submit_partial_update(descriptor(&format!("pkg/{i}")))
                .await
                .unwrap();
            handle.outcome().await
        }));
    }
    for submitter in submitters {
        let result = tokio::time::timeout(WAIT, submitter)
            .await
            .expect("submitter finishes")
            .expect("submitter task");
        assert!(result.succeeded());
    }

    assert_eq!(h.executor.calls().len(), 10);
    assert_eq!(h.executor.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn merge_failure_skips_the_build() {
    let merger = FakeMerger {
        fail: true,
        ..FakeMerger::default()
    };
    let mut h = start(FakeExecutor::default(), merger, RecordingPublisher::default());

    let handle = h
        .coordinator
        .submit_partial_update(descriptor("test/pkg"))
        .await
        .unwrap();
    let result = outcome(handle).await;

    assert!(
        matches!(
            result.error,
            Some(BuildError::ConfigMergeFailure(ConfigMergeError::InvalidJson(_)))
        ),
        "got {result:?}"
    );
    assert!(h.executor.calls().is_empty());
    assert_eq!(next(&mut h.stream).await, Some(result));

    // The loop keeps serving after a failed request.
    let rebuild = h.coordinator.submit_rebuild().await.unwrap();
    assert!(outcome(rebuild).await.succeeded());

    let messages = h.publisher.messages();
    let failure = messages
        .iter()
        .find(|m| m["msg"] == "error")
        .expect("error notification");
    assert!(failure["error"]
        .as_str()
        .unwrap()
        .contains("config file contains invalid JSON content"));
}

#[tokio::test]
async fn build_failure_is_reported_as_execution_failure() {
    let executor = FakeExecutor {
        behaviour: Behaviour::Fail,
        ..FakeExecutor::default()
    };
    let h = start(executor, FakeMerger::default(), RecordingPublisher::default());

    let handle = h.coordinator.submit_rebuild().await.unwrap();

    assert_eq!(
        outcome(handle).await.error,
        Some(BuildError::ExecutionFailure(ExecutionError::ExitStatus {
            code: Some(1)
        }))
    );
}

#[tokio::test]
async fn deadline_is_reported_as_execution_timeout() {
    let executor = FakeExecutor {
        behaviour: Behaviour::WaitForDeadline,
        ..FakeExecutor::default()
    };
    let mut h = start_with(
        CoordinatorConfig::new("satis.json").with_build_timeout(Duration::from_millis(50)),
        executor,
        FakeMerger::default(),
        RecordingPublisher::default(),
    );

    let partial = h
        .coordinator
        .submit_partial_update(descriptor("test/pkg"))
        .await
        .unwrap();
    let result = outcome(partial).await;

    let error = result.error.clone().expect("timeout error");
    assert!(error.is_timeout(), "got {error:?}");
    assert_eq!(error.to_string(), "build tool execution timeout");
    assert_eq!(next(&mut h.stream).await, Some(result));

    // Not retried: one invocation only.
    assert_eq!(h.executor.calls().len(), 1);
}

#[tokio::test]
async fn partial_build_notifications_follow_the_request() {
    let h = start(
        FakeExecutor::default(),
        FakeMerger::default(),
        RecordingPublisher::default(),
    );

    let handle = h
        .coordinator
        .submit_partial_update(descriptor("test/pkg"))
        .await
        .unwrap();
    assert!(outcome(handle).await.succeeded());

    assert_eq!(
        h.publisher.summary(),
        vec![
            "service:indexhub service start",
            "partialBuild:start",
            "partialBuild:completed",
        ]
    );
    let completed = &h.publisher.messages()[2];
    assert_eq!(completed["package"]["name"], "test/pkg");
    assert_eq!(completed["package"]["type"], "vcs");
    assert!(completed["time"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn notification_failures_never_fail_a_build() {
    let publisher = RecordingPublisher {
        fail: true,
        ..RecordingPublisher::default()
    };
    let h = start(FakeExecutor::default(), FakeMerger::default(), publisher);

    let handle = h
        .coordinator
        .submit_partial_update(descriptor("test/pkg"))
        .await
        .unwrap();

    assert!(outcome(handle).await.succeeded());
}

#[tokio::test]
async fn close_drains_the_queue_and_ends_the_stream() {
    let (executor, gate) = gated();
    let mut h = start(executor, FakeMerger::default(), RecordingPublisher::default());

    let first = h
        .coordinator
        .submit_partial_update(descriptor("a/first"))
        .await
        .unwrap();
    let second = h
        .coordinator
        .submit_partial_update(descriptor("b/second"))
        .await
        .unwrap();
    h.coordinator.close();
    h.coordinator.close();
    gate.add_permits(10);

    assert!(outcome(first).await.succeeded());
    assert!(outcome(second).await.succeeded());
    assert!(next(&mut h.stream).await.is_some());
    assert!(next(&mut h.stream).await.is_some());
    assert_eq!(next(&mut h.stream).await, None);

    let publisher = h.publisher.clone();
    eventually(|| {
        publisher
            .summary()
            .last()
            .is_some_and(|last| last == "service:indexhub service exit")
    })
    .await;
}

#[tokio::test]
async fn cancellation_discards_queued_requests() {
    let (executor, _gate) = gated();
    let mut h = start(executor, FakeMerger::default(), RecordingPublisher::default());

    let running = h
        .coordinator
        .submit_partial_update(descriptor("a/first"))
        .await
        .unwrap();
    let queued = h
        .coordinator
        .submit_partial_update(descriptor("b/second"))
        .await
        .unwrap();
    let queued_id = queued.id();

    // Let the loop pick up the first request before shutting down.
    let executor = h.executor.clone();
    eventually(|| !executor.calls().is_empty()).await;
    h.cancel.cancel();

    assert_eq!(
        outcome(running).await.error,
        Some(BuildError::ExecutionFailure(ExecutionError::Cancelled))
    );
    assert_eq!(outcome(queued).await, BuildOutcome::discarded(queued_id));
    assert!(next(&mut h.stream).await.is_some());
    assert_eq!(next(&mut h.stream).await, None);
    assert_eq!(h.executor.calls(), vec![scoped("a/first")]);

    assert!(h.coordinator.submit_rebuild().await.is_err());
}

#[tokio::test]
async fn oversized_timeout_does_not_bring_down_the_loop() {
    let mut h = start_with(
        CoordinatorConfig::new("satis.json").with_build_timeout(Duration::from_secs(u64::MAX)),
        FakeExecutor::default(),
        FakeMerger::default(),
        RecordingPublisher::default(),
    );

    let first = h.coordinator.submit_rebuild().await.unwrap();
    let first = outcome(first).await;
    assert!(first.succeeded(), "got {first:?}");
    assert_eq!(next(&mut h.stream).await, Some(first));

    let again = h
        .coordinator
        .submit_partial_update(descriptor("test/pkg"))
        .await
        .expect("loop still accepting requests");
    assert!(outcome(again).await.succeeded());
    assert_eq!(h.executor.calls(), vec![BuildMode::Full, scoped("test/pkg")]);
}

#[tokio::test]
async fn shutdown_during_merge_skips_the_build() {
    let mut h = start(
        FakeExecutor::default(),
        FakeMerger::default(),
        RecordingPublisher::default(),
    );
    *h.merger.cancel_during_merge.lock().unwrap() = Some(h.cancel.clone());

    let handle = h
        .coordinator
        .submit_partial_update(descriptor("test/pkg"))
        .await
        .unwrap();

    assert_eq!(
        outcome(handle).await.error,
        Some(BuildError::ExecutionFailure(ExecutionError::Cancelled))
    );
    assert_eq!(h.merger.calls.lock().unwrap().len(), 1);
    assert!(h.executor.calls().is_empty());
    assert!(next(&mut h.stream).await.is_some());
    assert_eq!(next(&mut h.stream).await, None);
}

#[tokio::test]
async fn full_queue_back_pressures_submitters() {
    let (executor, gate) = gated();
    let h = start_with(
        CoordinatorConfig::new("satis.json").with_queue_capacity(1),
        executor,
        FakeMerger::default(),
        RecordingPublisher::default(),
    );

    let running = h.coordinator.submit_rebuild().await.unwrap();
    let executor = h.executor.clone();
    eventually(|| !executor.calls().is_empty()).await;
    let queued = h
        .coordinator
        .submit_partial_update(descriptor("a/queued"))
        .await
        .unwrap();

    let coordinator = h.coordinator.clone();
    let mut blocked = tokio::spawn(async move {
        coordinator
            .submit_partial_update(descriptor("b/blocked"))
            .await
    });
    assert!(
        tokio::time::timeout(Duration::from_millis(100), &mut blocked)
            .await
            .is_err(),
        "submit should wait for queue space"
    );

    gate.add_permits(10);
    let blocked = tokio::time::timeout(WAIT, blocked)
        .await
        .expect("submit completes once space frees up")
        .expect("submitter task")
        .expect("accepted");

    for handle in [running, queued, blocked] {
        assert!(outcome(handle).await.succeeded());
    }
    assert_eq!(
        h.executor.calls(),
        vec![BuildMode::Full, scoped("a/queued"), scoped("b/blocked")]
    );
}

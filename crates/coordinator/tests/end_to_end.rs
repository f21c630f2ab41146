//! The coordinator wired to the real configuration merger and process
//! executor, with `echo` standing in for the build tool.
#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use coordinator::{Coordinator, CoordinatorConfig, Notifier};
use domain::{BuildError, PackageDescriptor, RepositoryKind, RepositoryUrl};
use executor::{MemorySink, ProcessExecutor, ToolPaths};
use repoconfig::JsonFileMerger;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(10);

struct System {
    coordinator: Coordinator,
    config_path: std::path::PathBuf,
    stdout: MemorySink,
    _dir: TempDir,
}

fn system(timeout: Duration) -> System {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("satis.json");
    std::fs::write(&config_path, "{}").unwrap();

    let stdout = MemorySink::new();
    let executor = ProcessExecutor::new(
        ToolPaths {
            tool: "echo".into(),
            config: config_path.clone(),
            output: "outRepoDir".into(),
        },
        Arc::new(stdout.clone()),
        Arc::new(MemorySink::new()),
    );
    let coordinator = Coordinator::new(
        CoordinatorConfig::new(&config_path).with_build_timeout(timeout),
        Arc::new(executor),
        Arc::new(JsonFileMerger::new()),
        Notifier::disabled(),
    );
    System {
        coordinator,
        config_path,
        stdout,
        _dir: dir,
    }
}

fn descriptor() -> PackageDescriptor {
    PackageDescriptor::new(
        RepositoryUrl::new("https://gitlab.example.com/test/pkg.git").unwrap(),
        RepositoryKind::new("vcs").unwrap(),
    )
    .with_name("test/pkg")
}

#[tokio::test]
async fn partial_update_then_full_rebuild() {
    let system = system(Duration::from_secs(30));
    let cancel = CancellationToken::new();
    let mut stream = system.coordinator.run(cancel.clone()).unwrap();

    let handle = system
        .coordinator
        .submit_partial_update(descriptor())
        .await
        .unwrap();
    let outcome = tokio::time::timeout(WAIT, handle.outcome()).await.unwrap();
    assert!(outcome.succeeded(), "got {outcome:?}");

    let document = std::fs::read_to_string(&system.config_path).unwrap();
    assert_eq!(
        document,
        r#"{
  "repositories": [
    {
      "type": "vcs",
      "url": "https://gitlab.example.com/test/pkg.git"
    }
  ]
}"#
    );

    let handle = system.coordinator.submit_rebuild().await.unwrap();
    let outcome = tokio::time::timeout(WAIT, handle.outcome()).await.unwrap();
    assert!(outcome.succeeded(), "got {outcome:?}");

    let config = system.config_path.display().to_string();
    assert_eq!(
        system.stdout.lines(),
        vec![
            format!("build {config} outRepoDir test/pkg"),
            format!("build {config} outRepoDir"),
        ]
    );

    system.coordinator.close();
    assert!(stream.next().await.is_some());
    assert!(stream.next().await.is_some());
    assert!(tokio::time::timeout(WAIT, stream.next())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn zero_timeout_is_an_execution_timeout() {
    let system = system(Duration::ZERO);
    let _stream = system.coordinator.run(CancellationToken::new()).unwrap();

    let handle = system.coordinator.submit_rebuild().await.unwrap();
    let outcome = tokio::time::timeout(WAIT, handle.outcome()).await.unwrap();

    assert!(
        matches!(outcome.error, Some(BuildError::ExecutionTimeout(_))),
        "got {outcome:?}"
    );
    assert!(system.stdout.lines().is_empty());
}

#[tokio::test]
async fn broken_config_document_fails_before_building() {
    let system = system(Duration::from_secs(30));
    std::fs::write(&system.config_path, "{").unwrap();
    let _stream = system.coordinator.run(CancellationToken::new()).unwrap();

    let handle = system
        .coordinator
        .submit_partial_update(descriptor())
        .await
        .unwrap();
    let outcome = tokio::time::timeout(WAIT, handle.outcome()).await.unwrap();

    assert!(
        matches!(outcome.error, Some(BuildError::ConfigMergeFailure(_))),
        "got {outcome:?}"
    );
    assert!(system.stdout.lines().is_empty());
    assert_eq!(std::fs::read_to_string(&system.config_path).unwrap(), "{");
}

//! Subprocess execution of the build tool.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{BuildExecutor, BuildMode, Deadline, ExecutionError};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn, Instrument, Span};

use crate::sink::LineSink;

/// How long to wait for the output readers to reach end-of-file after the
/// child has been terminated. Descendants of the tool may keep the pipes open.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Locations handed to the build tool on every invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    /// The build tool executable.
    pub tool: PathBuf,
    /// The configuration document.
    pub config: PathBuf,
    /// The output directory.
    pub output: PathBuf,
}

impl ToolPaths {
    /// Arguments for one invocation: `build <config> <output> [<target>]`.
    pub fn args(&self, mode: &BuildMode) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            self.config.display().to_string(),
            self.output.display().to_string(),
        ];
        if let Some(target) = mode.target() {
            args.push(target.to_string());
        }
        args
    }
}

/// [`BuildExecutor`] that runs the build tool as a child process.
///
/// The child's standard output and standard error are read line by line into
/// the sinks supplied at construction. When the deadline expires the child is
/// killed. When the shutdown signal fires the child gets `shutdown_grace` to
/// finish before it is killed.
pub struct ProcessExecutor {
    paths: ToolPaths,
    stdout: Arc<dyn LineSink>,
    stderr: Arc<dyn LineSink>,
    shutdown_grace: Duration,
}

impl ProcessExecutor {
    /// Creates an executor writing output into the given sinks.
    pub fn new(paths: ToolPaths, stdout: Arc<dyn LineSink>, stderr: Arc<dyn LineSink>) -> Self {
        Self {
            paths,
            stdout,
            stderr,
            shutdown_grace: Duration::from_secs(10),
        }
    }

    /// Sets how long an in-flight build may continue after shutdown is signalled.
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// The paths passed to the build tool.
    pub fn paths(&self) -> &ToolPaths {
        &self.paths
    }

    fn spawn(&self, mode: &BuildMode) -> Result<Child, ExecutionError> {
        let args = self.paths.args(mode);
        debug!(tool = %self.paths.tool.display(), ?args, "starting build tool");

        Command::new(&self.paths.tool)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutionError::Spawn {
                program: self.paths.tool.display().to_string(),
                message: e.to_string(),
            })
    }

    async fn wait(
        &self,
        child: &mut Child,
        deadline: &Deadline,
    ) -> Result<ExitStatus, ExecutionError> {
        let expires_at = Instant::from_std(deadline.expires_at);

        tokio::select! {
            biased;

            () = tokio::time::sleep_until(expires_at) => {
                warn!(timeout = ?deadline.timeout, "build tool exceeded its deadline; terminating");
                terminate(child).await;
                Err(ExecutionError::DeadlineExceeded(deadline.exceeded()))
            }
            () = deadline.cancel.cancelled() => {
                debug!(grace = ?self.shutdown_grace, "shutdown requested during build");
                let grace_end = Instant::now()
                    .checked_add(self.shutdown_grace)
                    .map_or(expires_at, |end| end.min(expires_at));
                match tokio::time::timeout_at(grace_end, child.wait()).await {
                    Ok(status) => status.map_err(|e| ExecutionError::Io(e.to_string())),
                    Err(_) => {
                        warn!("build tool still running after shutdown grace period; terminating");
                        terminate(child).await;
                        if Instant::now() >= expires_at {
                            Err(ExecutionError::DeadlineExceeded(deadline.exceeded()))
                        } else {
                            Err(ExecutionError::Cancelled)
                        }
                    }
                }
            }
            status = child.wait() => status.map_err(|e| ExecutionError::Io(e.to_string())),
        }
    }
}

#[async_trait]
impl BuildExecutor for ProcessExecutor {
    async fn execute(&self, mode: &BuildMode, deadline: Deadline) -> Result<(), ExecutionError> {
        if deadline.is_expired() {
            return Err(ExecutionError::DeadlineExceeded(deadline.exceeded()));
        }

        let mut child = self.spawn(mode)?;
        let readers = [
            child
                .stdout
                .take()
                .map(|out| forward_lines(out, Arc::clone(&self.stdout))),
            child
                .stderr
                .take()
                .map(|err| forward_lines(err, Arc::clone(&self.stderr))),
        ];

        let status = self.wait(&mut child, &deadline).await;

        for reader in readers.into_iter().flatten() {
            drain(reader).await;
        }

        let status = status?;
        if status.success() {
            debug!("build tool finished");
            Ok(())
        } else {
            Err(ExecutionError::ExitStatus {
                code: status.code(),
            })
        }
    }
}

fn forward_lines<R>(reader: R, sink: Arc<dyn LineSink>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(
        async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => sink.line(&line),
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "failed to read build tool output");
                        break;
                    }
                }
            }
        }
        .instrument(Span::current()),
    )
}

async fn drain(mut reader: JoinHandle<()>) {
    if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut reader)
        .await
        .is_err()
    {
        warn!("build tool output still open after exit; abandoning reader");
        reader.abort();
    }
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill build tool");
    }
}

//! `indexhub serve`: wires the coordinator, executor, merger, notifier and
//! HTTP listener together and runs them until a shutdown signal.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use coordinator::notifications::error_chain;
use coordinator::{Coordinator, CoordinatorConfig, Notifier, ResultStream};
use domain::TopicId;
use executor::{ProcessExecutor, ToolPaths, TracingSink};
use listener::{
    ListenerConfig, ListenerState, Listeners, TlsConfig, DEFAULT_ADDR, DEFAULT_TLS_ADDR,
};
use notifier::{TopicTransport, DEFAULT_PUBLISH_TIMEOUT};
use repoconfig::JsonFileMerger;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::observability::ObservabilityConfig;

/// Extra time, beyond the build shutdown grace, allowed for the coordinator to
/// publish its exit notification and close the result stream.
const STOP_MARGIN: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Build tool executable.
    #[arg(long, env = "INDEXHUB_TOOL_PATH", default_value = "satis")]
    pub tool: PathBuf,

    /// Build tool configuration document.
    #[arg(long, env = "INDEXHUB_CONFIG_PATH", default_value = "satis.json")]
    pub config: PathBuf,

    /// Build output directory, served over HTTP(S).
    #[arg(long, env = "INDEXHUB_REPO_PATH", default_value = "repo")]
    pub repo: PathBuf,

    /// Per-build timeout in seconds.
    #[arg(long, env = "INDEXHUB_TIMEOUT", default_value_t = 1200)]
    pub timeout: u64,

    /// Notification topic: an SNS topic ARN, or an http(s) URL to POST to.
    #[arg(long, alias = "sns-topic-arn", env = "INDEXHUB_TOPIC")]
    pub topic: Option<String>,

    /// HTTP listen address.
    #[arg(long, env = "INDEXHUB_HTTP_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: SocketAddr,

    /// HTTPS listen address.
    #[arg(long, env = "INDEXHUB_TLS_ADDR", default_value = DEFAULT_TLS_ADDR)]
    pub tls_addr: SocketAddr,

    /// TLS certificate chain (PEM).
    #[arg(long, env = "INDEXHUB_TLS_CERT_PATH", default_value = "satis.crt")]
    pub tls_cert: PathBuf,

    /// TLS private key (PEM).
    #[arg(long, env = "INDEXHUB_TLS_KEY_PATH", default_value = "satis.key")]
    pub tls_key: PathBuf,

    /// Do not start the plain HTTP listener.
    #[arg(long, env = "INDEXHUB_NO_HTTP")]
    pub no_http: bool,

    /// Do not start the HTTPS listener.
    #[arg(long, env = "INDEXHUB_NO_TLS")]
    pub no_tls: bool,

    /// Seconds an in-flight build may keep running after shutdown begins.
    #[arg(long, env = "INDEXHUB_SHUTDOWN_GRACE", default_value_t = 10)]
    pub shutdown_grace: u64,

    /// Verbose (debug-level) logging.
    #[arg(long, env = "INDEXHUB_DEBUG")]
    pub debug: bool,

    /// Newline-delimited JSON logs.
    #[arg(long, env = "INDEXHUB_LOG_JSON")]
    pub json: bool,

    /// Export spans to this OTLP/gRPC collector.
    #[arg(long, env = "INDEXHUB_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl ServeArgs {
    pub fn observability(&self) -> ObservabilityConfig {
        ObservabilityConfig {
            debug: self.debug,
            json: self.json,
            otlp_endpoint: self.otlp_endpoint.clone(),
        }
    }

    fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace)
    }

    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            addr: (!self.no_http).then_some(self.addr),
            tls: (!self.no_tls).then(|| TlsConfig {
                addr: self.tls_addr,
                cert_path: self.tls_cert.clone(),
                key_path: self.tls_key.clone(),
            }),
            config_path: self.config.clone(),
            output_dir: self.repo.clone(),
        }
    }

    /// The notification topic, or `None` when unset or blank.
    pub fn topic(&self) -> Option<TopicId> {
        self.topic.as_deref().map(str::trim).and_then(TopicId::new)
    }
}

pub async fn run(args: ServeArgs) -> anyhow::Result<()> {
    info!(
        tool = %args.tool.display(),
        config = %args.config.display(),
        repo = %args.repo.display(),
        timeout = ?args.build_timeout(),
        http = %display_addr(!args.no_http, args.addr),
        https = %display_addr(!args.no_tls, args.tls_addr),
        topic = args.topic.as_deref().unwrap_or("-"),
        "starting indexhub"
    );

    let listener_config = args.listener_config();
    let listeners = Listeners::bind(&listener_config).await?;

    let notifier = notifier(&args).await?;
    debug!(enabled = notifier.is_enabled(), "notifier ready");
    let executor = ProcessExecutor::new(
        ToolPaths {
            tool: args.tool.clone(),
            config: args.config.clone(),
            output: args.repo.clone(),
        },
        Arc::new(TracingSink::stdout()),
        Arc::new(TracingSink::stderr()),
    )
    .with_shutdown_grace(args.shutdown_grace());
    let coordinator = Coordinator::new(
        CoordinatorConfig::new(&args.config).with_build_timeout(args.build_timeout()),
        Arc::new(executor),
        Arc::new(JsonFileMerger::new()),
        notifier,
    );

    let cancel = CancellationToken::new();
    let stream = coordinator.run(cancel.clone())?;
    let results = tokio::spawn(log_results(stream));

    let app = listener::router(ListenerState::new(coordinator.clone(), &listener_config));
    let mut server = tokio::spawn(listeners.serve(app, cancel.clone()));

    let stopped_early = tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received");
            None
        }
        joined = &mut server => Some(joined),
    };

    cancel.cancel();
    coordinator.close();

    let served = match stopped_early {
        Some(joined) => joined,
        None => server.await,
    };

    let stop_budget = args.shutdown_grace().saturating_add(STOP_MARGIN);
    match tokio::time::timeout(stop_budget, results).await {
        Ok(Ok(())) => info!("indexhub stopped"),
        Ok(Err(err)) => warn!(error = %err, "result logger task failed"),
        Err(_) => warn!(
            budget = ?stop_budget,
            "build coordinator did not stop within the shutdown budget"
        ),
    }

    served
        .context("listener task failed")?
        .context("listener failed")
}

fn display_addr(enabled: bool, addr: SocketAddr) -> String {
    if enabled {
        addr.to_string()
    } else {
        "disabled".to_string()
    }
}

async fn notifier(args: &ServeArgs) -> anyhow::Result<Notifier> {
    let Some(topic) = args.topic() else {
        debug!("no notification topic configured");
        return Ok(Notifier::disabled());
    };
    let transport = TopicTransport::for_topic(&topic).context("invalid notification topic")?;
    info!(%topic, transport = transport.label(), "publishing notifications");
    let publisher = notifier::publisher_for(&topic, DEFAULT_PUBLISH_TIMEOUT)
        .await
        .context("failed to build the notification client")?;
    Ok(Notifier::new(topic, publisher))
}

async fn log_results(mut stream: ResultStream) {
    while let Some(outcome) = stream.next().await {
        match &outcome.error {
            None => debug!(id = %outcome.id, "build finished"),
            Some(err) => error!(id = %outcome.id, error = %error_chain(err), "build failed"),
        }
    }
    debug!("result stream closed");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

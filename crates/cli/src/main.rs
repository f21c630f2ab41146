//! IndexHub entry point.
//!
//! This binary is the composition root for the entire system:
//!
//! 1. **Parse configuration**: flags with environment fallbacks (`clap`).
//! 2. **Wire observability**: `tracing-subscriber` with a text or JSON layer and
//!    an optional OpenTelemetry OTLP exporter. All spans and events emitted by
//!    every crate in the workspace flow through it.
//! 3. **Construct infrastructure**: the process executor, the configuration
//!    merger, and the notification publisher, injected into the coordinator.
//! 4. **Serve**: run the coordinator and the HTTP listener until Ctrl-C or
//!    SIGTERM, then shut both down.

mod observability;
mod serve;

use clap::{Parser, Subcommand};
use tracing::error;

#[derive(Debug, Parser)]
#[command(name = "indexhub", version, about = "Package index build service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the build coordinator and the HTTP listener.
    Serve(serve::ServeArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            let telemetry = observability::init(&args.observability())?;
            let result = serve::run(args).await;
            if let Err(err) = &result {
                error!(error = %format!("{err:#}"), "indexhub stopped with an error");
            }
            telemetry.shutdown();
            result
        }
    }
}

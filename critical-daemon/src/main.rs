use std::future::Future;

use anyhow::Result;
use clap::Parser;

use critical_daemon::cli::DaemonCli;
use critical_daemon::{logging, metrics_server, orchestrator};
use critical_router::Handler;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    logging::init_tracing(cli.log_level(), cli.log_format)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "critical-daemon starting");

    if let Some(addr) = cli.metrics_listen {
        metrics_server::install_metrics_recorder(addr)?;
    }

    let handler = orchestrator::load_handler(&cli.config_path())
        .await
        .inspect_err(|e| tracing::error!(error = %e, "startup failed"))?;

    let shutdown = async {
        match orchestrator::wait_for_shutdown_signal().await {
            Ok(signal) => tracing::info!(signal, "shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "signal handling failed, shutting down"),
        }
    };

    consume(&cli, handler, shutdown)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "daemon failed"))?;

    tracing::info!("critical-daemon shut down");
    Ok(())
}

#[cfg(feature = "kafka")]
async fn consume(cli: &DaemonCli, handler: Handler, shutdown: impl Future<Output = ()>) -> Result<()> {
    let source = orchestrator::kafka_source(&cli.kafka_server, &handler);
    orchestrator::run(handler, source, shutdown).await?;
    Ok(())
}

#[cfg(not(feature = "kafka"))]
async fn consume(cli: &DaemonCli, handler: Handler, _shutdown: impl Future<Output = ()>) -> Result<()> {
    Err(anyhow::anyhow!(
        "cannot consume '{}' from {}: critical-daemon was built with --no-default-features (no `kafka`)",
        handler.consumer_specification(),
        cli.kafka_server
    ))
}

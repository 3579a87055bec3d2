//! Startup and shutdown orchestration.
//!
//! # Startup order
//!
//! 1. Load the handler document and build the handler (nothing is started)
//! 2. Start the handler: senders, then dynamic filters
//! 3. Size the worker pool from the topic's partition count and fork units
//! 4. Run workers until the shutdown future resolves
//!
//! # Shutdown order
//!
//! 1. Cancel workers; each finishes its in-flight record and stops its unit
//! 2. Stop the handler
//!
//! Any startup failure stops whatever already started and is returned
//! before a single record is consumed.

use std::future::Future;
use std::path::Path;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use critical_core::HandlerSpec;
use critical_router::{Handler, Registry, StreamSource, WorkerPool, WorkerStats};

/// Totals over every worker of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub workers: Vec<WorkerStats>,
}

impl RunSummary {
    pub fn received(&self) -> u64 {
        self.workers.iter().map(|w| w.received).sum()
    }

    pub fn dispatched(&self) -> u64 {
        self.workers.iter().map(|w| w.dispatched).sum()
    }

    pub fn filtered(&self) -> u64 {
        self.workers.iter().map(|w| w.filtered).sum()
    }

    pub fn failed(&self) -> u64 {
        self.workers.iter().map(WorkerStats::failed).sum()
    }
}

/// Loads and validates the handler document, then builds every component.
pub async fn load_handler(config_path: &Path) -> Result<Handler> {
    let spec = HandlerSpec::load(config_path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", config_path.display(), e))?;

    let handler = Handler::from_spec(&spec, &Registry::with_defaults())
        .map_err(|e| anyhow::anyhow!("failed to build handler '{}': {}", spec.name, e))?;

    tracing::info!(
        handler = handler.name(),
        topic = handler.consumer_specification(),
        group = %handler.group_id(),
        senders = handler.sender_count(),
        "handler initialized"
    );
    Ok(handler)
}

/// Kafka source for `handler`: its topic, its consumer group, and the
/// given bootstrap servers. Nothing is connected until the pool starts it.
#[cfg(feature = "kafka")]
pub fn kafka_source(bootstrap_servers: &str, handler: &Handler) -> critical_router::KafkaSource {
    use critical_router::{KafkaSettings, KafkaSource};

    KafkaSource::new(KafkaSettings::new(
        bootstrap_servers,
        handler.consumer_specification(),
        handler.group_id(),
    ))
}

/// Runs `handler` over `source` until `shutdown` resolves.
///
/// `source` becomes worker 0; the pool forks one more unit per extra
/// partition.
pub async fn run<S, F>(mut handler: Handler, source: S, shutdown: F) -> Result<RunSummary>
where
    S: StreamSource,
    F: Future<Output = ()>,
{
    if let Err(e) = handler.start().await {
        stop_handler(&mut handler).await;
        return Err(anyhow::anyhow!("failed to start handler '{}': {}", handler.name(), e));
    }

    let pool = match WorkerPool::spawn(source).await {
        Ok(pool) => pool,
        Err(e) => {
            stop_handler(&mut handler).await;
            return Err(anyhow::anyhow!("failed to start workers: {}", e));
        }
    };

    tracing::info!(
        handler = handler.name(),
        workers = pool.worker_count(),
        "critical-daemon running"
    );

    let token = CancellationToken::new();
    let (workers, ()) = tokio::join!(pool.run(&handler, token.clone()), async {
        shutdown.await;
        tracing::info!("shutdown requested, stopping workers");
        token.cancel();
    });

    stop_handler(&mut handler).await;

    let summary = RunSummary { workers };
    tracing::info!(
        received = summary.received(),
        dispatched = summary.dispatched(),
        filtered = summary.filtered(),
        failed = summary.failed(),
        "critical-daemon stopped"
    );
    Ok(summary)
}

async fn stop_handler(handler: &mut Handler) {
    if let Err(e) = handler.stop().await {
        tracing::error!(handler = handler.name(), error = %e, "failed to stop handler cleanly");
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("failed to install Ctrl-C handler: {}", e))?;
    Ok("Ctrl-C")
}

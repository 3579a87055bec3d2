//! Partition worker pool.
//!
//! One worker per topic partition; all workers are futures joined in the
//! caller's task and borrow the same [`Handler`]. Records of one partition
//! are handled strictly in order because a worker awaits each `handle`.

use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use critical_core::Record;
use critical_core::metrics::{
    CONSUME_ERRORS_TOTAL, DECODE_ERRORS_TOTAL, RECORDS_RECEIVED_TOTAL, WORKERS_ACTIVE,
};

use super::StreamSource;
use crate::error::RouterError;
use crate::handler::{HandleOutcome, Handler};

/// Pause after a transport error before consuming again.
pub const TRANSPORT_BACKOFF: Duration = Duration::from_secs(1);

/// Number of workers for the source's topic: its partition count, at least 1.
///
/// An unstarted source is started for the query and stopped again.
pub async fn target_worker_count<S: StreamSource>(source: &mut S) -> Result<usize, RouterError> {
    let transient = !source.is_started();
    if transient {
        source.start().await?;
    }

    let count = source.partition_count().await;

    let stopped = if transient {
        source.stop().await
    } else {
        Ok(())
    };
    if let Err(e) = stopped {
        tracing::warn!(error = %e, "failed to stop transient stream connection");
    }

    Ok(count?.max(1))
}

/// Counters of one worker, returned when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub index: usize,
    pub received: u64,
    pub filtered: u64,
    pub dispatched: u64,
    pub decode_errors: u64,
    pub consume_errors: u64,
    pub failed_deliveries: u64,
}

impl WorkerStats {
    /// Records lost to decode or transport errors.
    pub fn failed(&self) -> u64 {
        self.decode_errors + self.consume_errors
    }
}

/// Started consumption units, one per partition. Index 0 is the parent.
pub struct WorkerPool<S> {
    units: Vec<S>,
}

impl<S: StreamSource> WorkerPool<S> {
    /// Starts `parent` if needed and forks it until there is one unit per
    /// partition.
    ///
    /// If any step fails, every unit started so far (the parent included)
    /// is stopped before the error is returned.
    pub async fn spawn(mut parent: S) -> Result<Self, RouterError> {
        if !parent.is_started() {
            parent.start().await?;
        }

        let count = match target_worker_count(&mut parent).await {
            Ok(count) => count,
            Err(e) => {
                stop_all(vec![parent]).await;
                return Err(e);
            }
        };

        let mut units = Vec::with_capacity(count);
        for index in 1..count {
            match parent.fork().await {
                Ok(unit) => units.push(unit),
                Err(e) => {
                    tracing::error!(worker = index, error = %e, "failed to fork stream unit");
                    units.insert(0, parent);
                    stop_all(units).await;
                    return Err(e);
                }
            }
        }
        units.insert(0, parent);

        tracing::info!(workers = units.len(), "worker pool ready");
        Ok(Self { units })
    }

    pub fn worker_count(&self) -> usize {
        self.units.len()
    }

    /// Runs every worker until `shutdown` is cancelled, then returns the
    /// per-worker statistics in index order.
    pub async fn run(self, handler: &Handler, shutdown: CancellationToken) -> Vec<WorkerStats> {
        let workers = self
            .units
            .into_iter()
            .enumerate()
            .map(|(index, unit)| run_worker(index, unit, handler, shutdown.clone()));
        join_all(workers).await
    }

    /// Stops every unit without running it.
    pub async fn shutdown(self) {
        stop_all(self.units).await;
    }
}

impl<S> std::fmt::Debug for WorkerPool<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.units.len())
            .finish()
    }
}

async fn stop_all<S: StreamSource>(units: Vec<S>) {
    for (index, mut unit) in units.into_iter().enumerate() {
        if let Err(e) = unit.stop().await {
            tracing::warn!(worker = index, error = %e, "failed to stop stream unit");
        }
    }
}

async fn run_worker<S: StreamSource>(
    index: usize,
    mut unit: S,
    handler: &Handler,
    shutdown: CancellationToken,
) -> WorkerStats {
    let mut stats = WorkerStats {
        index,
        ..WorkerStats::default()
    };
    let active = metrics::gauge!(WORKERS_ACTIVE);
    active.increment(1.0);
    tracing::info!(worker = index, handler = handler.name(), "worker started");

    loop {
        let consumed = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            consumed = unit.consume() => consumed,
        };

        let payload = match consumed {
            Ok(payload) => payload,
            Err(e) => {
                stats.consume_errors += 1;
                metrics::counter!(CONSUME_ERRORS_TOTAL).increment(1);
                tracing::warn!(worker = index, error = %e, "consume failed, backing off");
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(TRANSPORT_BACKOFF) => continue,
                }
            }
        };

        stats.received += 1;
        metrics::counter!(RECORDS_RECEIVED_TOTAL).increment(1);

        let record = match Record::from_slice(&payload) {
            Ok(record) => record,
            Err(e) => {
                stats.decode_errors += 1;
                metrics::counter!(DECODE_ERRORS_TOTAL).increment(1);
                tracing::warn!(worker = index, bytes = payload.len(), error = %e, "dropping undecodable record");
                continue;
            }
        };

        match handler.handle(&record).await {
            HandleOutcome::Filtered { .. } => stats.filtered += 1,
            outcome @ HandleOutcome::Dispatched(_) => {
                stats.dispatched += 1;
                stats.failed_deliveries += outcome.failed_deliveries() as u64;
            }
        }
    }

    if let Err(e) = unit.stop().await {
        tracing::warn!(worker = index, error = %e, "failed to stop stream unit");
    }
    active.decrement(1.0);
    tracing::info!(
        worker = index,
        received = stats.received,
        dispatched = stats.dispatched,
        filtered = stats.filtered,
        failed = stats.failed(),
        "worker stopped"
    );
    stats
}

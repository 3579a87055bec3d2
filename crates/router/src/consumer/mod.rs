//! Stream consumption: sources of raw record payloads and the partition
//! worker pool that drives them.
//!
//! A [`StreamSource`] is one consumption unit bound to a topic and consumer
//! group. The pool sizes itself to the topic's partition count and forks
//! one unit per extra partition, so the broker spreads partitions across
//! the units of the group.

#[cfg(feature = "kafka")]
mod kafka;
mod pool;

use std::future::Future;

use bytes::Bytes;

use crate::error::RouterError;

#[cfg(feature = "kafka")]
pub use kafka::{KafkaSettings, KafkaSource};
pub use pool::{TRANSPORT_BACKOFF, WorkerPool, WorkerStats, target_worker_count};

/// One consumption unit of a topic/group binding.
pub trait StreamSource: Send + Sized + 'static {
    /// Connects and subscribes.
    fn start(&mut self) -> impl Future<Output = Result<(), RouterError>> + Send;

    /// Unsubscribes and disconnects. Safe without a prior `start`.
    fn stop(&mut self) -> impl Future<Output = Result<(), RouterError>> + Send;

    fn is_started(&self) -> bool;

    /// Number of partitions of the bound topic. Requires a started unit.
    fn partition_count(&self) -> impl Future<Output = Result<usize, RouterError>> + Send;

    /// A fresh, started unit with the same binding. Never mutates `self`.
    fn fork(&self) -> impl Future<Output = Result<Self, RouterError>> + Send;

    /// Next payload; suspends until one arrives.
    fn consume(&mut self) -> impl Future<Output = Result<Bytes, RouterError>> + Send;
}

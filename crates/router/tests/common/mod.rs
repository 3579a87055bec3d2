//! Shared fakes for router integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use critical_router::error::RouterError;
use critical_router::sender::Sender;
use critical_router::{StreamSource, SuppressionStore};

/// GELF payload from `ip` with the given short message.
pub fn gelf(ip: &str, short_message: &str) -> Bytes {
    Bytes::from(
        serde_json::json!({
            "version": "1.1",
            "host": "edge-01",
            "short_message": short_message,
            "full_message": format!("{short_message}\nstack trace"),
            "timestamp": 1_700_000_000.25,
            "level": 2,
            "_gl2_remote_ip": ip,
        })
        .to_string(),
    )
}

/// Sender recording `(receiver, text)`; clones share the log.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    receivers: Vec<String>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
    stops: Arc<AtomicUsize>,
}

impl Recorder {
    pub fn new(receivers: &[&str]) -> Self {
        Self {
            receivers: receivers.iter().map(|r| (*r).to_owned()).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Sender for Recorder {
    fn kind(&self) -> &'static str {
        "recorder"
    }

    fn prefix(&self) -> &str {
        "rec_"
    }

    fn receivers(&self) -> &[String] {
        &self.receivers
    }

    async fn stop(&mut self) -> Result<(), RouterError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_one(&self, text: &str, receiver: &str) -> Result<(), RouterError> {
        self.calls
            .lock()
            .unwrap()
            .push((receiver.to_owned(), text.to_owned()));
        Ok(())
    }
}

/// Shared in-memory suppression sets.
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    sets: Arc<Mutex<HashMap<String, HashSet<String>>>>,
    refuse_connect: bool,
}

impl SharedStore {
    pub fn refusing() -> Self {
        Self {
            refuse_connect: true,
            ..Self::default()
        }
    }
}

impl SuppressionStore for SharedStore {
    async fn connect(&mut self) -> Result<(), RouterError> {
        if self.refuse_connect {
            return Err(RouterError::Store {
                reason: "connection refused".to_owned(),
            });
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), RouterError> {
        Ok(())
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, RouterError> {
        let sets = self.sets.lock().unwrap();
        Ok(sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn add(&self, key: &str, pattern: &str) -> Result<bool, RouterError> {
        let mut sets = self.sets.lock().unwrap();
        Ok(sets.entry(key.to_owned()).or_default().insert(pattern.to_owned()))
    }

    async fn remove(&self, key: &str, pattern: &str) -> Result<bool, RouterError> {
        let mut sets = self.sets.lock().unwrap();
        Ok(sets.get_mut(key).is_some_and(|set| set.remove(pattern)))
    }
}

#[derive(Debug, Default)]
pub struct SourceState {
    pub running: AtomicUsize,
    pub forks: AtomicUsize,
    queue: Mutex<VecDeque<Bytes>>,
}

/// Stream source fed from a shared queue; consume pends when it is empty.
#[derive(Debug)]
pub struct QueueSource {
    partitions: usize,
    fail_fork_after: Option<usize>,
    started: bool,
    pub state: Arc<SourceState>,
}

impl QueueSource {
    pub fn new(partitions: usize) -> Self {
        Self {
            partitions,
            fail_fork_after: None,
            started: false,
            state: Arc::default(),
        }
    }

    /// Forks succeed `n` times, then fail.
    pub fn fail_fork_after(mut self, n: usize) -> Self {
        self.fail_fork_after = Some(n);
        self
    }

    pub fn push(&self, payload: Bytes) {
        self.state.queue.lock().unwrap().push_back(payload);
    }
}

impl StreamSource for QueueSource {
    async fn start(&mut self) -> Result<(), RouterError> {
        if !self.started {
            self.started = true;
            self.state.running.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RouterError> {
        if self.started {
            self.started = false;
            self.state.running.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started
    }

    async fn partition_count(&self) -> Result<usize, RouterError> {
        Ok(self.partitions)
    }

    async fn fork(&self) -> Result<Self, RouterError> {
        let done = self.state.forks.fetch_add(1, Ordering::SeqCst);
        if self.fail_fork_after.is_some_and(|n| done >= n) {
            return Err(RouterError::Stream {
                reason: "fork refused".to_owned(),
            });
        }
        self.state.running.fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            partitions: self.partitions,
            fail_fork_after: self.fail_fork_after,
            started: true,
            state: Arc::clone(&self.state),
        })
    }

    async fn consume(&mut self) -> Result<Bytes, RouterError> {
        loop {
            let next = self.state.queue.lock().unwrap().pop_front();
            match next {
                Some(payload) => return Ok(payload),
                None => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
            }
        }
    }
}

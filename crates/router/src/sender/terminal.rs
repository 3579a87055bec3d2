//! Terminal sender for local runs and dry runs.
//!
//! Writes one `[<receiver>] <text>` line per delivery. Receivers are just
//! labels; they still take part in suppression under the `term_` prefix.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use critical_core::ComponentSpec;

use super::{Sender, deserialize_receivers};
use crate::error::RouterError;

pub const KIND: &str = "terminal";
pub const PREFIX: &str = "term_";

type Output = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TerminalParams {
    #[serde(deserialize_with = "deserialize_receivers")]
    receivers: Vec<String>,
}

/// Line-oriented sender writing to stdout or any async writer.
pub struct TerminalSender {
    receivers: Vec<String>,
    out: Mutex<Output>,
    written: AtomicU64,
}

impl TerminalSender {
    pub fn new(receivers: Vec<String>) -> Self {
        Self::with_writer(receivers, tokio::io::stdout())
    }

    pub fn with_writer(receivers: Vec<String>, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            receivers,
            out: Mutex::new(Box::new(writer)),
            written: AtomicU64::new(0),
        }
    }

    pub fn from_spec(spec: &ComponentSpec) -> Result<Self, RouterError> {
        let params: TerminalParams = spec.params()?;
        Ok(Self::new(params.receivers))
    }

    /// Lines written so far.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for TerminalSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalSender")
            .field("receivers", &self.receivers)
            .field("written", &self.written())
            .finish()
    }
}

impl Sender for TerminalSender {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn prefix(&self) -> &str {
        PREFIX
    }

    fn receivers(&self) -> &[String] {
        &self.receivers
    }

    async fn stop(&mut self) -> Result<(), RouterError> {
        self.out
            .get_mut()
            .flush()
            .await
            .map_err(|e| RouterError::Lifecycle {
                component: KIND.to_owned(),
                reason: format!("flush failed: {e}"),
            })
    }

    async fn send_one(&self, text: &str, receiver: &str) -> Result<(), RouterError> {
        let line = format!("[{receiver}] {text}\n");
        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes())
            .await
            .and(out.flush().await)
            .map_err(|e| RouterError::Delivery {
                sender: KIND,
                receiver: receiver.to_owned(),
                reason: format!("write failed: {e}"),
            })?;
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

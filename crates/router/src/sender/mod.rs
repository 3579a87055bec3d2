//! Destination senders and the fan-out dispatcher.
//!
//! A sender owns a fixed receiver list and a suppression-key prefix. The
//! [`dispatch`] function checks every receiver against the dynamic
//! filters, then delivers to the remaining receivers concurrently and
//! waits for all of them.
//!
//! # Kinds
//!
//! | kind       | prefix  | transport                  |
//! |------------|---------|----------------------------|
//! | `telegram` | `tg_`   | Bot API `sendMessage`      |
//! | `mail`     | `mail_` | SMTP                       |
//! | `terminal` | `term_` | stdout                     |

pub mod mail;
pub mod telegram;
pub mod terminal;

use std::future::Future;

use futures::future::join_all;
use serde::Deserialize;

use critical_core::metrics::{
    DELIVERIES_TOTAL, LABEL_RESULT, LABEL_SENDER, SUPPRESSION_LOOKUP_ERRORS_TOTAL,
};

use crate::BoxFuture;
use crate::error::RouterError;
use crate::suppression::DynDynamicFilter;

pub use mail::{MailRelay, MailSender, SmtpRelay};
pub use telegram::{ChatApi, ChatApiError, TelegramBotApi, TelegramSender};
pub use terminal::TerminalSender;

/// Suppression-key prefix for a sender kind.
pub fn suppression_prefix(kind: &str) -> Option<&'static str> {
    match kind {
        telegram::KIND => Some(telegram::PREFIX),
        mail::KIND => Some(mail::PREFIX),
        terminal::KIND => Some(terminal::PREFIX),
        _ => None,
    }
}

/// Delivery channel with a fixed set of receivers.
pub trait Sender: Send + Sync {
    /// Registry kind, used in logs and metrics.
    fn kind(&self) -> &'static str;

    /// Suppression-key prefix; disambiguates receivers of different kinds.
    fn prefix(&self) -> &str;

    fn receivers(&self) -> &[String];

    /// Acquires the outbound session.
    fn start(&mut self) -> impl Future<Output = Result<(), RouterError>> + Send {
        async { Ok(()) }
    }

    /// Releases the outbound session. Safe without a prior `start`.
    fn stop(&mut self) -> impl Future<Output = Result<(), RouterError>> + Send {
        async { Ok(()) }
    }

    /// Delivers `text` to a single receiver, including any retries the
    /// transport calls for.
    fn send_one(
        &self,
        text: &str,
        receiver: &str,
    ) -> impl Future<Output = Result<(), RouterError>> + Send;
}

/// Dyn-compatible companion of [`Sender`].
pub trait DynSender: Send + Sync {
    fn kind(&self) -> &'static str;

    fn prefix(&self) -> &str;

    fn receivers(&self) -> &[String];

    fn start(&mut self) -> BoxFuture<'_, Result<(), RouterError>>;

    fn stop(&mut self) -> BoxFuture<'_, Result<(), RouterError>>;

    fn send_one<'a>(&'a self, text: &'a str, receiver: &'a str)
    -> BoxFuture<'a, Result<(), RouterError>>;
}

impl<T: Sender> DynSender for T {
    fn kind(&self) -> &'static str {
        Sender::kind(self)
    }

    fn prefix(&self) -> &str {
        Sender::prefix(self)
    }

    fn receivers(&self) -> &[String] {
        Sender::receivers(self)
    }

    fn start(&mut self) -> BoxFuture<'_, Result<(), RouterError>> {
        Box::pin(Sender::start(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), RouterError>> {
        Box::pin(Sender::stop(self))
    }

    fn send_one<'a>(
        &'a self,
        text: &'a str,
        receiver: &'a str,
    ) -> BoxFuture<'a, Result<(), RouterError>> {
        Box::pin(Sender::send_one(self, text, receiver))
    }
}

/// Outcome of one [`dispatch`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub suppressed: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.delivered + self.suppressed + self.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Delivered,
    Suppressed,
    Failed,
}

impl Delivery {
    fn label(self) -> &'static str {
        match self {
            Delivery::Delivered => "delivered",
            Delivery::Suppressed => "suppressed",
            Delivery::Failed => "failed",
        }
    }
}

/// Sends `text` to every receiver of `sender` that no filter suppresses.
///
/// Filters are consulted per receiver with key `prefix + receiver`, in
/// order, stopping at the first that suppresses. Deliveries run
/// concurrently; one failing receiver never affects the others.
pub async fn dispatch(
    sender: &dyn DynSender,
    text: &str,
    filters: &[&dyn DynDynamicFilter],
) -> DispatchReport {
    let deliveries = sender.receivers().iter().map(|receiver| async move {
        let key = format!("{}{}", sender.prefix(), receiver);
        if is_suppressed(filters, text, &key).await {
            tracing::debug!(sender = sender.kind(), %receiver, "delivery suppressed");
            return Delivery::Suppressed;
        }

        match sender.send_one(text, receiver).await {
            Ok(()) => {
                tracing::debug!(sender = sender.kind(), %receiver, "delivered");
                Delivery::Delivered
            }
            Err(e) => {
                tracing::warn!(sender = sender.kind(), %receiver, error = %e, "delivery failed");
                Delivery::Failed
            }
        }
    });

    let mut report = DispatchReport::default();
    for outcome in join_all(deliveries).await {
        metrics::counter!(
            DELIVERIES_TOTAL,
            LABEL_SENDER => sender.kind(),
            LABEL_RESULT => outcome.label()
        )
        .increment(1);
        match outcome {
            Delivery::Delivered => report.delivered += 1,
            Delivery::Suppressed => report.suppressed += 1,
            Delivery::Failed => report.failed += 1,
        }
    }
    report
}

/// A failed lookup counts as "not suppressed".
async fn is_suppressed(filters: &[&dyn DynDynamicFilter], text: &str, key: &str) -> bool {
    for filter in filters {
        match filter.suppress(text, key).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => {
                metrics::counter!(SUPPRESSION_LOOKUP_ERRORS_TOTAL).increment(1);
                tracing::warn!(
                    filter = filter.name(),
                    key,
                    error = %e,
                    "suppression lookup failed, delivering anyway"
                );
            }
        }
    }
    false
}

/// Receiver ids may be written as YAML numbers (chat ids) or strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum ReceiverId {
    Int(i64),
    Text(String),
}

pub(crate) fn deserialize_receivers<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let ids = Vec::<ReceiverId>::deserialize(deserializer)?;
    Ok(ids
        .into_iter()
        .map(|id| match id {
            ReceiverId::Int(n) => n.to_string(),
            ReceiverId::Text(s) => s,
        })
        .collect())
}

//! Telegram Bot API sender.
//!
//! Delivers via `POST {api_url}/bot{token}/sendMessage`. A 429 response
//! carries `parameters.retry_after`; the sender waits that long and retries
//! the same delivery with no retry limit. Every other failure abandons the
//! receiver.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use critical_core::ComponentSpec;
use critical_core::metrics::{DELIVERY_RETRIES_TOTAL, LABEL_SENDER};

use super::{Sender, deserialize_receivers};
use crate::error::RouterError;

pub const KIND: &str = "telegram";
pub const PREFIX: &str = "tg_";

/// Public Bot API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// `sendMessage` text limit in characters.
pub const MESSAGE_LIMIT: usize = 4096;

const TRUNCATION_MARKER: &str = "\n\n[truncated]";

/// Wait used when a 429 response does not say how long to back off.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure of a single chat API call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatApiError {
    /// Rate limited; the same call may be retried after the wait.
    #[error("rate limited, retry after {0:?}")]
    RetryAfter(Duration),

    /// Anything else; not retried.
    #[error("{0}")]
    Other(String),
}

/// Chat bot API boundary.
pub trait ChatApi: Send + Sync + 'static {
    /// Opens the outbound session.
    fn open(&mut self) -> impl Future<Output = Result<(), RouterError>> + Send {
        async { Ok(()) }
    }

    /// Closes the outbound session. Safe without a prior `open`.
    fn close(&mut self) -> impl Future<Output = Result<(), RouterError>> + Send {
        async { Ok(()) }
    }

    fn send_message(
        &self,
        chat_id: &str,
        text: &str,
    ) -> impl Future<Output = Result<(), ChatApiError>> + Send;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Maps a Bot API HTTP response onto the call outcome.
fn classify_response(status: u16, body: &str) -> Result<(), ChatApiError> {
    if (200..300).contains(&status) {
        return Ok(());
    }

    let parsed: Option<ApiResponse> = serde_json::from_str(body).ok();
    if status == 429 {
        let wait = parsed
            .as_ref()
            .and_then(|r| r.parameters.as_ref())
            .and_then(|p| p.retry_after)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RETRY_AFTER);
        return Err(ChatApiError::RetryAfter(wait));
    }

    let description = parsed
        .and_then(|r| r.description)
        .unwrap_or_else(|| body.chars().take(200).collect());
    Err(ChatApiError::Other(format!("HTTP {status}: {description}")))
}

/// HTTP client for the Telegram Bot API.
pub struct TelegramBotApi {
    endpoint: String,
    parse_mode: Option<String>,
    client: Option<Client>,
}

impl TelegramBotApi {
    pub fn new(api_url: &str, token: &str, parse_mode: Option<String>) -> Self {
        Self {
            endpoint: format!("{}/bot{}/sendMessage", api_url.trim_end_matches('/'), token),
            parse_mode,
            client: None,
        }
    }
}

impl std::fmt::Debug for TelegramBotApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // endpoint embeds the bot token
        f.debug_struct("TelegramBotApi")
            .field("parse_mode", &self.parse_mode)
            .field("open", &self.client.is_some())
            .finish()
    }
}

impl ChatApi for TelegramBotApi {
    async fn open(&mut self) -> Result<(), RouterError> {
        if self.client.is_none() {
            let client = Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .map_err(|e| RouterError::Lifecycle {
                    component: KIND.to_owned(),
                    reason: format!("failed to build HTTP client: {e}"),
                })?;
            self.client = Some(client);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), RouterError> {
        self.client = None;
        Ok(())
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChatApiError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ChatApiError::Other("session not started".to_owned()))?;

        let mut payload = json!({ "chat_id": chat_id, "text": text });
        if let Some(mode) = &self.parse_mode {
            payload["parse_mode"] = json!(mode);
        }

        let response = client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChatApiError::Other(format!("request failed: {}", e.without_url())))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        classify_response(status, &body)
    }
}

/// Truncates `text` to the API limit, marking the cut.
pub fn truncate_message(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_owned();
    }
    let budget = limit.saturating_sub(TRUNCATION_MARKER.chars().count());
    let truncated: String = text.chars().take(budget).collect();
    format!("{truncated}{TRUNCATION_MARKER}")
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TelegramParams {
    token: String,
    #[serde(deserialize_with = "deserialize_receivers")]
    receivers: Vec<String>,
    #[serde(default)]
    api_url: Option<String>,
    #[serde(default)]
    parse_mode: Option<String>,
}

/// Chat sender; one chat id per receiver.
#[derive(Debug)]
pub struct TelegramSender<A = TelegramBotApi> {
    receivers: Vec<String>,
    api: A,
}

impl<A: ChatApi> TelegramSender<A> {
    pub fn new(receivers: Vec<String>, api: A) -> Self {
        Self { receivers, api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }
}

impl TelegramSender<TelegramBotApi> {
    pub fn from_spec(spec: &ComponentSpec) -> Result<Self, RouterError> {
        let params: TelegramParams = spec.params()?;
        if params.token.trim().is_empty() {
            return Err(RouterError::invalid("telegram.token", "must not be empty"));
        }
        let api_url = params.api_url.as_deref().unwrap_or(DEFAULT_API_URL);
        let api = TelegramBotApi::new(api_url, &params.token, params.parse_mode);
        Ok(Self::new(params.receivers, api))
    }
}

impl<A: ChatApi> Sender for TelegramSender<A> {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn prefix(&self) -> &str {
        PREFIX
    }

    fn receivers(&self) -> &[String] {
        &self.receivers
    }

    async fn start(&mut self) -> Result<(), RouterError> {
        self.api.open().await
    }

    async fn stop(&mut self) -> Result<(), RouterError> {
        self.api.close().await
    }

    async fn send_one(&self, text: &str, receiver: &str) -> Result<(), RouterError> {
        let text = truncate_message(text, MESSAGE_LIMIT);
        loop {
            match self.api.send_message(receiver, &text).await {
                Ok(()) => return Ok(()),
                Err(ChatApiError::RetryAfter(wait)) => {
                    metrics::counter!(DELIVERY_RETRIES_TOTAL, LABEL_SENDER => KIND).increment(1);
                    tracing::warn!(
                        receiver,
                        retry_after_secs = wait.as_secs(),
                        "rate limited by chat API, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(ChatApiError::Other(reason)) => {
                    return Err(RouterError::Delivery {
                        sender: KIND,
                        receiver: receiver.to_owned(),
                        reason,
                    });
                }
            }
        }
    }
}

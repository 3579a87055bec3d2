//! SMTP sender.
//!
//! The rendered text is sent as a raw RFC 5322 message. Unless the text
//! already declares a `Subject:` header, a header block with `From`, `To`,
//! `Subject` and a UTF-8 content type is prepended. Line endings are
//! normalized to CRLF. Each delivery is attempted once.

use std::future::Future;
use std::time::Duration;

use lettre::address::{Address, Envelope};
use lettre::transport::smtp::Error as SmtpError;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::AsyncSmtpConnection;
use lettre::transport::smtp::extension::ClientId;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use serde::Deserialize;

use critical_core::ComponentSpec;

use super::{Sender, deserialize_receivers};
use crate::error::RouterError;

pub const KIND: &str = "mail";
pub const PREFIX: &str = "mail_";

const DEFAULT_SUBJECT: &str = "critical alert";
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// SMTP boundary: hands a finished message to a relay.
pub trait MailRelay: Send + Sync + 'static {
    fn open(&mut self) -> impl Future<Output = Result<(), RouterError>> + Send {
        async { Ok(()) }
    }

    /// Safe without a prior `open`.
    fn close(&mut self) -> impl Future<Output = Result<(), RouterError>> + Send {
        async { Ok(()) }
    }

    fn deliver(
        &self,
        from: &str,
        to: &str,
        message: &str,
    ) -> impl Future<Output = Result<(), RouterError>> + Send;
}

/// Connection settings of an [`SmtpRelay`].
#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub credentials: Option<(String, String)>,
    /// Open a new session for every delivery instead of one pooled session.
    pub fresh_session: bool,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.credentials.as_ref().map(|(user, _)| user))
            .field("fresh_session", &self.fresh_session)
            .finish()
    }
}

/// Plain SMTP relay built on lettre's tokio transport.
pub struct SmtpRelay {
    settings: SmtpSettings,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl std::fmt::Debug for SmtpRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpRelay")
            .field("settings", &self.settings)
            .field("open", &self.transport.is_some())
            .finish()
    }
}

impl SmtpRelay {
    pub fn new(settings: SmtpSettings) -> Self {
        Self {
            settings,
            transport: None,
        }
    }

    pub fn settings(&self) -> &SmtpSettings {
        &self.settings
    }

    fn build_transport(&self) -> AsyncSmtpTransport<Tokio1Executor> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(self.settings.host.as_str())
                .port(self.settings.port)
                .timeout(Some(SMTP_TIMEOUT));
        if let Some(credentials) = self.credentials() {
            builder = builder.credentials(credentials);
        }
        builder.build()
    }

    fn credentials(&self) -> Option<Credentials> {
        self.settings
            .credentials
            .as_ref()
            .map(|(user, password)| Credentials::new(user.clone(), password.clone()))
    }

    /// One delivery over its own session; the session is closed before
    /// returning whatever the outcome.
    async fn deliver_fresh(
        &self,
        envelope: &Envelope,
        to: &str,
        message: &[u8],
    ) -> Result<(), RouterError> {
        let mut connection = AsyncSmtpConnection::connect_tokio1(
            (self.settings.host.as_str(), self.settings.port),
            Some(SMTP_TIMEOUT),
            &ClientId::default(),
            None,
            None,
        )
        .await
        .map_err(|e| self.smtp_error(to, e))?;

        let sent = self.send_on(&mut connection, envelope, message).await;
        // QUIT, then shut the socket down
        connection.abort().await;
        sent.map_err(|e| self.smtp_error(to, e))
    }

    async fn send_on(
        &self,
        connection: &mut AsyncSmtpConnection,
        envelope: &Envelope,
        message: &[u8],
    ) -> Result<(), SmtpError> {
        if let Some(credentials) = self.credentials() {
            connection
                .auth(&[Mechanism::Plain, Mechanism::Login], &credentials)
                .await?;
        }
        connection.send(envelope, message).await?;
        Ok(())
    }

    fn smtp_error(&self, to: &str, e: impl std::fmt::Display) -> RouterError {
        RouterError::Delivery {
            sender: KIND,
            receiver: to.to_owned(),
            reason: format!("{}:{}: {e}", self.settings.host, self.settings.port),
        }
    }
}

impl MailRelay for SmtpRelay {
    async fn open(&mut self) -> Result<(), RouterError> {
        if self.settings.fresh_session || self.transport.is_some() {
            return Ok(());
        }

        let transport = self.build_transport();
        transport
            .test_connection()
            .await
            .map_err(|e| RouterError::Lifecycle {
                component: KIND.to_owned(),
                reason: format!(
                    "cannot reach {}:{}: {e}",
                    self.settings.host, self.settings.port
                ),
            })?;
        tracing::info!(host = %self.settings.host, port = self.settings.port, "smtp session opened");
        self.transport = Some(transport);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), RouterError> {
        if self.transport.take().is_some() {
            tracing::info!(host = %self.settings.host, "smtp session closed");
        }
        Ok(())
    }

    async fn deliver(&self, from: &str, to: &str, message: &str) -> Result<(), RouterError> {
        let from_addr: Address = from.parse().map_err(|e| self.smtp_error(to, e))?;
        let to_addr: Address = to.parse().map_err(|e| self.smtp_error(to, e))?;
        let envelope =
            Envelope::new(Some(from_addr), vec![to_addr]).map_err(|e| self.smtp_error(to, e))?;

        if self.settings.fresh_session {
            return self.deliver_fresh(&envelope, to, message.as_bytes()).await;
        }

        let transport = self.transport.as_ref().ok_or_else(|| RouterError::Delivery {
            sender: KIND,
            receiver: to.to_owned(),
            reason: "session not started".to_owned(),
        })?;
        transport
            .send_raw(&envelope, message.as_bytes())
            .await
            .map_err(|e| self.smtp_error(to, e))?;
        Ok(())
    }
}

/// Whether the header block of `text` declares a subject.
///
/// The header block ends at the first empty line.
fn declares_subject(text: &str) -> bool {
    text.lines()
        .take_while(|line| !line.trim().is_empty())
        .any(|line| {
            line.get(..8)
                .is_some_and(|head| head.eq_ignore_ascii_case("subject:"))
        })
}

/// `text` with every line ending (`\r\n`, bare `\n` or bare `\r`) as CRLF.
fn crlf_line_endings(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 16);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                chars.next_if_eq(&'\n');
                out.push_str("\r\n");
            }
            '\n' => out.push_str("\r\n"),
            c => out.push(c),
        }
    }
    out
}

/// Builds the raw message handed to the relay. Only CRLF line endings
/// reach the wire.
pub fn compose_message(from: &str, to: &str, subject: &str, text: &str) -> String {
    let text = crlf_line_endings(text);
    if declares_subject(&text) {
        return text;
    }
    format!(
        "From: {from}\r\nTo: {to}\r\nSubject: {subject}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{text}"
    )
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MailParams {
    host: String,
    #[serde(default = "default_smtp_port")]
    port: u16,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    from: String,
    #[serde(default = "default_subject")]
    subject: String,
    #[serde(deserialize_with = "deserialize_receivers")]
    receivers: Vec<String>,
    #[serde(default)]
    fresh_session: bool,
}

fn default_smtp_port() -> u16 {
    25
}

fn default_subject() -> String {
    DEFAULT_SUBJECT.to_owned()
}

/// Mail sender; one mailbox per receiver.
#[derive(Debug)]
pub struct MailSender<R = SmtpRelay> {
    from: String,
    subject: String,
    receivers: Vec<String>,
    relay: R,
}

impl<R: MailRelay> MailSender<R> {
    pub fn new(
        from: impl Into<String>,
        subject: impl Into<String>,
        receivers: Vec<String>,
        relay: R,
    ) -> Self {
        Self {
            from: from.into(),
            subject: subject.into(),
            receivers,
            relay,
        }
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }
}

impl MailSender<SmtpRelay> {
    pub fn from_spec(spec: &ComponentSpec) -> Result<Self, RouterError> {
        let params: MailParams = spec.params()?;

        params
            .from
            .parse::<Address>()
            .map_err(|e| RouterError::invalid("mail.from", format!("'{}': {e}", params.from)))?;
        for receiver in &params.receivers {
            receiver
                .parse::<Address>()
                .map_err(|e| RouterError::invalid("mail.receivers", format!("'{receiver}': {e}")))?;
        }

        let credentials = match (params.username, params.password) {
            (Some(user), Some(password)) => Some((user, password)),
            (None, None) => None,
            _ => {
                return Err(RouterError::invalid(
                    "mail.username",
                    "username and password must be given together",
                ));
            }
        };

        let relay = SmtpRelay::new(SmtpSettings {
            host: params.host,
            port: params.port,
            credentials,
            fresh_session: params.fresh_session,
        });
        Ok(Self::new(params.from, params.subject, params.receivers, relay))
    }
}

impl<R: MailRelay> Sender for MailSender<R> {
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
        self.relay.open().await
    }

    async fn stop(&mut self) -> Result<(), RouterError> {
        self.relay.close().await
    }

    async fn send_one(&self, text: &str, receiver: &str) -> Result<(), RouterError> {
        let message = compose_message(&self.from, receiver, &self.subject, text);
        self.relay.deliver(&self.from, receiver, &message).await
    }
}

//! `critical suppress` command handler
//!
//! Edits the pattern sets the `redis_exclude_*` dynamic filters read.
//! Changes take effect on the next lookup; running daemons need no restart.

use std::io::Write;

use serde::Serialize;
use tracing::info;

use critical_router::SuppressionStore;
use critical_router::sender::suppression_prefix;
use critical_router::suppression::RedisStore;

use crate::cli::{SuppressAction, SuppressArgs, SuppressTarget};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `suppress` command against the Redis store named by the
/// target.
pub async fn execute(args: SuppressArgs, writer: &OutputWriter) -> Result<(), CliError> {
    let target = match &args.action {
        SuppressAction::Add { target, .. }
        | SuppressAction::Remove { target, .. }
        | SuppressAction::Show { target } => target.clone(),
    };

    let mut store = RedisStore::from_url(target.redis_url.as_str());
    store.connect().await?;
    let result = apply(&store, &target, args.action).await;
    if let Err(e) = store.disconnect().await {
        tracing::warn!(error = %e, "failed to close suppression store connection");
    }

    let mut report = result?;
    report.redis_url = redact_url(&target.redis_url);
    writer.render(&report)
}

/// Applies `action` to a connected store and reports the resulting set.
pub async fn apply<S: SuppressionStore>(
    store: &S,
    target: &SuppressTarget,
    action: SuppressAction,
) -> Result<SuppressReport, CliError> {
    let key = suppression_key(target)?;

    let (action, changed) = match action {
        SuppressAction::Add { pattern, .. } => {
            let added = store.add(&key, &pattern).await?;
            info!(key = %key, pattern = %pattern, added, "suppression pattern added");
            ("add", Some(added))
        }
        SuppressAction::Remove { pattern, .. } => {
            let removed = store.remove(&key, &pattern).await?;
            info!(key = %key, pattern = %pattern, removed, "suppression pattern removed");
            ("remove", Some(removed))
        }
        SuppressAction::Show { .. } => ("show", None),
    };

    let mut patterns = store.members(&key).await?;
    patterns.sort();

    Ok(SuppressReport {
        key,
        redis_url: target.redis_url.clone(),
        action,
        changed,
        patterns,
    })
}

/// Resolves `--key`, or `--sender` plus `--receiver`, to a store key.
pub fn suppression_key(target: &SuppressTarget) -> Result<String, CliError> {
    if let Some(key) = &target.key {
        if key.is_empty() {
            return Err(CliError::Command("--key must not be empty".to_owned()));
        }
        return Ok(key.clone());
    }

    match (&target.sender, &target.receiver) {
        (Some(sender), Some(receiver)) => {
            let prefix = suppression_prefix(sender).ok_or_else(|| {
                CliError::Command(format!(
                    "unknown sender kind: {} (expected: telegram, mail, terminal)",
                    sender
                ))
            })?;
            Ok(format!("{prefix}{receiver}"))
        }
        _ => Err(CliError::Command(
            "either --key or --sender with --receiver is required".to_owned(),
        )),
    }
}

/// Replaces `user:password@` in a connection URL with `***REDACTED***@`.
pub fn redact_url(url: &str) -> String {
    if let Some(scheme_end) = url.find("://") {
        let scheme = &url[..scheme_end + 3];
        let rest = &url[scheme_end + 3..];

        if let Some(at_pos) = rest.find('@') {
            let credentials = match rest.find('/') {
                Some(slash_pos) => at_pos < slash_pos,
                None => true,
            };
            if credentials {
                return format!("{}***REDACTED***{}", scheme, &rest[at_pos..]);
            }
        }
    }
    url.to_owned()
}

/// State of one suppression key after a command.
#[derive(Debug, Serialize)]
pub struct SuppressReport {
    pub key: String,
    /// Store URL with credentials redacted
    pub redis_url: String,
    pub action: &'static str,
    /// Whether add/remove changed the set; absent for `show`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
    pub patterns: Vec<String>,
}

impl Render for SuppressReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Suppression key: {} ({})", self.key.bold(), self.redis_url)?;

        match (self.action, self.changed) {
            ("add", Some(true)) => writeln!(w, "  {}", "pattern added".green())?,
            ("add", Some(false)) => writeln!(w, "  {}", "pattern already present".yellow())?,
            ("remove", Some(true)) => writeln!(w, "  {}", "pattern removed".green())?,
            ("remove", Some(false)) => writeln!(w, "  {}", "pattern not present".yellow())?,
            _ => {}
        }

        if self.patterns.is_empty() {
            writeln!(w, "  No patterns")?;
        } else {
            writeln!(w, "  Patterns ({}):", self.patterns.len().to_string().bold())?;
            for pattern in &self.patterns {
                writeln!(w, "    {}", pattern)?;
            }
        }
        Ok(())
    }
}

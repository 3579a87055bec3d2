//! `critical dry-run` command handler
//!
//! Shows what a handler would send for one record. Nothing is started:
//! no sender connects and no suppression store is consulted.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use critical_core::error::CriticalError;
use critical_core::{HandlerSpec, Record};
use critical_router::{Handler, Preview, Registry};

use crate::cli::DryRunArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `dry-run` command.
pub async fn execute(args: DryRunArgs, writer: &OutputWriter) -> Result<(), CliError> {
    let report = preview(&args.config, &args.record).await?;
    writer.render(&report)
}

/// Loads the handler and record and runs the static filters and formatter.
pub async fn preview(config: &Path, record: &Path) -> Result<DryRunReport, CliError> {
    let spec = HandlerSpec::load(config).await?;
    let handler = Handler::from_spec(&spec, &Registry::with_defaults())?;

    let raw = tokio::fs::read(record).await?;
    let record = Record::from_slice(&raw).map_err(CriticalError::from)?;

    info!(handler = handler.name(), "previewing record");

    let report = match handler.preview(&record) {
        Preview::Filtered { filter } => DryRunReport {
            handler: handler.name().to_owned(),
            outcome: Outcome::Filtered,
            filter: Some(filter),
            text: None,
        },
        Preview::Rendered(text) => DryRunReport {
            handler: handler.name().to_owned(),
            outcome: Outcome::Rendered,
            filter: None,
            text: Some(text),
        },
    };
    Ok(report)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Filtered,
    Rendered,
}

/// Result of previewing one record.
#[derive(Debug, Serialize)]
pub struct DryRunReport {
    pub handler: String,
    pub outcome: Outcome,
    /// Kind of the static filter that rejected the record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<&'static str>,
    /// Text every sender would receive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Render for DryRunReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Dry run: {}", self.handler.bold())?;
        match (&self.filter, &self.text) {
            (Some(filter), _) => {
                writeln!(w, "  Result: {} by {}", "FILTERED".yellow().bold(), filter)?;
            }
            (None, Some(text)) => {
                writeln!(w, "  Result: {}", "SEND".green().bold())?;
                writeln!(w)?;
                writeln!(w, "{}", text)?;
            }
            (None, None) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filtered_report_renders_filter_kind() {
        colored::control::set_override(false);
        let report = DryRunReport {
            handler: "core".to_owned(),
            outcome: Outcome::Filtered,
            filter: Some("source_ip"),
            text: None,
        };

        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        let text = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(text.contains("FILTERED by source_ip"));
    }

    #[test]
    fn test_rendered_report_json() {
        let report = DryRunReport {
            handler: "core".to_owned(),
            outcome: Outcome::Rendered,
            filter: None,
            text: Some("disk full".to_owned()),
        };

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["outcome"], "rendered");
        assert_eq!(json["text"], "disk full");
        assert!(json.get("filter").is_none());
    }
}

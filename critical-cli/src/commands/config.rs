//! `critical config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use critical_core::HandlerSpec;
use critical_router::{Handler, Registry};

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `config` command.
pub async fn execute(args: ConfigArgs, writer: &OutputWriter) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate { path } => execute_validate(&path, writer).await,
    }
}

/// Execute the config validate subcommand.
///
/// # Errors
///
/// Returns `CliError::Config` if the document does not load or a component
/// cannot be built.
async fn execute_validate(path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    let report = validate(path).await;
    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("handler document is invalid".to_owned()));
    }
    Ok(())
}

/// Loads `path` and builds every component it names, without starting any.
pub async fn validate(path: &Path) -> ConfigValidationReport {
    info!(path = %path.display(), "validating handler document");

    let mut report = ConfigValidationReport {
        source: path.display().to_string(),
        valid: false,
        handler: None,
        group_id: None,
        senders: 0,
        errors: Vec::new(),
    };

    let spec = match HandlerSpec::load(path).await {
        Ok(spec) => spec,
        Err(e) => {
            report.errors.push(e.to_string());
            return report;
        }
    };

    match Handler::from_spec(&spec, &Registry::with_defaults()) {
        Ok(handler) => {
            report.valid = true;
            report.handler = Some(handler.name().to_owned());
            report.group_id = Some(handler.group_id());
            report.senders = handler.sender_count();
        }
        Err(e) => report.errors.push(e.to_string()),
    }
    report
}

/// Handler document validation report.
#[derive(Debug, Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    /// Kafka consumer group the handler would join.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub senders: usize,
    /// Validation error messages (empty if valid)
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
            if let Some(handler) = &self.handler {
                writeln!(w, "  Handler: {}", handler)?;
            }
            if let Some(group_id) = &self.group_id {
                writeln!(w, "  Consumer group: {}", group_id)?;
            }
            writeln!(w, "  Senders: {}", self.senders)?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write temp file");
        file
    }

    #[tokio::test]
    async fn test_validate_accepts_terminal_handler() {
        let file = write_temp(
            r#"
name: Disk Alerts
consumer_specification: syslog
formatter:
  kind: copy_field
  field: short_message
senders:
  - kind: terminal
    receivers: [ops]
"#,
        );

        let report = validate(file.path()).await;
        assert!(report.valid, "errors: {:?}", report.errors);
        assert_eq!(report.handler.as_deref(), Some("Disk Alerts"));
        assert_eq!(report.group_id.as_deref(), Some("syslog:diskalerts"));
        assert_eq!(report.senders, 1);
    }

    #[tokio::test]
    async fn test_validate_reports_unknown_sender_kind() {
        let file = write_temp(
            r#"
name: pager
consumer_specification: syslog
formatter:
  kind: copy_field
  field: short_message
senders:
  - kind: pager
    receivers: [ops]
"#,
        );

        let report = validate(file.path()).await;
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("pager"));
    }

    #[tokio::test]
    async fn test_validate_reports_missing_file() {
        let report = validate(Path::new("/nonexistent/critical/handler.yml")).await;
        assert!(!report.valid);
        assert!(report.handler.is_none());
        assert!(!report.errors.is_empty());
    }

    #[test]
    fn test_invalid_report_renders_errors() {
        colored::control::set_override(false);
        let report = ConfigValidationReport {
            source: "handler.yml".to_owned(),
            valid: false,
            handler: None,
            group_id: None,
            senders: 0,
            errors: vec!["unknown sender kind 'pager'".to_owned()],
        };

        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        let text = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(text.contains("INVALID"));
        assert!(text.contains("Error: unknown sender kind 'pager'"));
    }
}

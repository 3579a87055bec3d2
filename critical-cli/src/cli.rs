//! CLI argument parsing using clap derive API
//!
//! Purely declarative; no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// critical -- operator tool for the log-alert router.
///
/// Use `critical <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "critical", version, about, long_about = None)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage dynamic suppression patterns.
    Suppress(SuppressArgs),

    /// Manage handler documents.
    Config(ConfigArgs),

    /// Run one record through a handler's static filters and formatter.
    DryRun(DryRunArgs),
}

// ---- suppress ----

/// Manage suppression patterns stored in Redis.
#[derive(Args, Debug)]
pub struct SuppressArgs {
    #[command(subcommand)]
    pub action: SuppressAction,
}

#[derive(Subcommand, Debug)]
pub enum SuppressAction {
    /// Add a pattern for a destination.
    Add {
        #[command(flatten)]
        target: SuppressTarget,
        /// Substring or regular expression, depending on the filter kind.
        pattern: String,
    },
    /// Remove a pattern from a destination.
    Remove {
        #[command(flatten)]
        target: SuppressTarget,
        pattern: String,
    },
    /// List the patterns of a destination.
    Show {
        #[command(flatten)]
        target: SuppressTarget,
    },
}

/// Store and destination key of a suppress command.
///
/// The key is either given verbatim (`--key tg_-100123`) or derived from a
/// sender kind and receiver (`--sender telegram --receiver -100123`).
#[derive(Args, Debug, Clone)]
pub struct SuppressTarget {
    /// Redis URL of the suppression store.
    #[arg(long, env = "CRITICAL_REDIS_URL", default_value = "redis://127.0.0.1:6379/0")]
    pub redis_url: String,

    /// Suppression key, `<sender prefix><receiver>`.
    #[arg(long, conflicts_with_all = ["sender", "receiver"])]
    pub key: Option<String>,

    /// Sender kind (telegram, mail, terminal).
    #[arg(long, requires = "receiver")]
    pub sender: Option<String>,

    /// Receiver id as written in the handler document.
    #[arg(long, requires = "sender", allow_hyphen_values = true)]
    pub receiver: Option<String>,
}

// ---- config ----

/// Manage handler documents.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Load a handler document and build every component without starting it.
    Validate {
        /// Handler document (YAML).
        path: PathBuf,
    },
}

// ---- dry-run ----

/// Decode a record and show what the handler would send.
#[derive(Args, Debug)]
pub struct DryRunArgs {
    /// Handler document (YAML).
    pub config: PathBuf,

    /// GELF record (JSON file).
    pub record: PathBuf,
}

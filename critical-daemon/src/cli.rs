//! CLI argument definitions for critical-daemon.
//!
//! Uses `clap` v4 derive macros. Every option can also come from a
//! `CRITICAL_*` environment variable.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Machine-parseable JSON lines.
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

/// critical log-alert router.
///
/// Consumes GELF records from one Kafka topic, filters and formats them
/// according to a handler document, and delivers the result to the
/// configured senders.
#[derive(Parser, Debug)]
#[command(name = "critical-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Handler document (YAML), relative to --etc-path if given.
    pub config: PathBuf,

    /// Kafka bootstrap servers, comma separated.
    #[arg(long, env = "CRITICAL_KAFKA_SERVER")]
    pub kafka_server: String,

    /// Base directory the handler document path is resolved against.
    #[arg(long, env = "CRITICAL_ETC_PATH")]
    pub etc_path: Option<PathBuf>,

    /// Verbosity: 0 error, 1 warn, 2 info, 3 or more debug.
    #[arg(short, long = "verbose", action = ArgAction::Count, env = "CRITICAL_VERBOSITY")]
    pub verbose: u8,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_listen: Option<SocketAddr>,
}

impl DaemonCli {
    /// Handler document path with `--etc-path` applied.
    pub fn config_path(&self) -> PathBuf {
        match &self.etc_path {
            Some(base) => base.join(&self.config),
            None => self.config.clone(),
        }
    }

    /// `tracing` level directive for the verbosity count.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "error",
            1 => "warn",
            2 => "info",
            _ => "debug",
        }
    }
}

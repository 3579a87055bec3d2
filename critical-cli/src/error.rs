//! CLI-specific error types and exit code mapping

use critical_core::error::CriticalError;
use critical_router::RouterError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Handler document loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Suppression store unreachable or rejected a command.
    #[error("store error: {0}")]
    Store(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from critical-core.
    #[error("{0}")]
    Core(#[from] CriticalError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                   |
    /// |------|---------------------------|
    /// | 0    | Success                   |
    /// | 1    | General / command error   |
    /// | 2    | Configuration error       |
    /// | 3    | Suppression store error   |
    /// | 10   | IO error                  |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(CriticalError::Config(_)) => 2,
            Self::Store(_) => 3,
            Self::Io(_) | Self::Core(CriticalError::Io(_)) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}

impl From<RouterError> for CliError {
    fn from(e: RouterError) -> Self {
        match e {
            RouterError::Store { reason } => Self::Store(reason),
            RouterError::Config(config) => Self::Config(config.to_string()),
            other => Self::Command(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use critical_core::error::{ConfigError, DecodeError};

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("missing senders".to_owned());
        assert_eq!(err.exit_code(), 2, "config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_core_config_error() {
        let err = CliError::from(CriticalError::Config(ConfigError::FileNotFound {
            path: "/etc/critical/handler.yml".to_owned(),
        }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_store_error() {
        let err = CliError::Store("connection refused".to_owned());
        assert_eq!(err.exit_code(), 3, "store error should return exit code 3");
    }

    #[test]
    fn test_exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = CliError::Io(io_err);
        assert_eq!(err.exit_code(), 10, "io error should return exit code 10");
    }

    #[test]
    fn test_exit_code_decode_error() {
        let err = CliError::from(CriticalError::Decode(DecodeError::TooLarge {
            size: 10,
            max: 5,
        }));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_json_serialize_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid json")
            .expect_err("should fail parsing");
        let err = CliError::JsonSerialize(json_err);
        assert_eq!(
            err.exit_code(),
            1,
            "json serialize error should return exit code 1"
        );
    }

    #[test]
    fn test_from_router_store_error() {
        let err = CliError::from(RouterError::Store {
            reason: "timeout".to_owned(),
        });
        match err {
            CliError::Store(reason) => assert_eq!(reason, "timeout"),
            other => panic!("expected Store variant, got {other:?}"),
        }
    }

    #[test]
    fn test_from_router_config_error() {
        let err = CliError::from(RouterError::Config(ConfigError::UnknownKind {
            component: "sender",
            kind: "pager".to_owned(),
        }));
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("pager"));
    }

    #[test]
    fn test_error_display_command() {
        let err = CliError::Command("execution failed".to_owned());
        assert_eq!(format!("{}", err), "execution failed");
    }
}

//! Error types shared by every critical crate.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum CriticalError {
    /// Handler configuration problem; fatal at startup.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A stream payload could not be turned into a record.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Runtime failure reported by a router component.
    #[error("{component} error: {reason}")]
    Component {
        component: &'static str,
        reason: String,
    },
}

/// Handler configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// The document is not valid YAML or does not match the schema.
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A `kind` that no factory is registered for.
    #[error("unknown {component} kind '{kind}'")]
    UnknownKind {
        component: &'static str,
        kind: String,
    },

    /// A field is present but its value is unusable.
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Record decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("record too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("malformed record at {line}:{column}: {reason}")]
    Malformed {
        line: usize,
        column: usize,
        reason: String,
    },
}

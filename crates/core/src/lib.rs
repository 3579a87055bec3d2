//! Shared building blocks of the critical log-alert router.
//!
//! - [`record`]: the decoded GELF [`Record`]
//! - [`config`]: the declarative [`HandlerSpec`] document
//! - [`error`]: the error taxonomy
//! - [`metrics`]: metric names emitted across the workspace

pub mod config;
pub mod error;
pub mod metrics;
pub mod record;

pub use config::{ComponentSpec, HandlerSpec};
pub use error::{ConfigError, CriticalError, DecodeError};
pub use record::Record;

//! Router error type
//!
//! [`RouterError`] covers every failure inside the router. It converts into
//! [`CriticalError`] so binaries can propagate it with `?`.

use critical_core::error::{ConfigError, CriticalError, DecodeError};

/// Router domain error.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Component construction failed; fatal at startup.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A payload could not be decoded into a record.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Suppression store unreachable or returned an error.
    #[error("store error: {reason}")]
    Store { reason: String },

    /// Stream transport failure (connect, metadata, consume).
    #[error("stream error: {reason}")]
    Stream { reason: String },

    /// One delivery to one receiver failed and will not be retried.
    #[error("delivery via {sender} to '{receiver}' failed: {reason}")]
    Delivery {
        sender: &'static str,
        receiver: String,
        reason: String,
    },

    /// Start or stop of a component failed.
    #[error("{component} lifecycle error: {reason}")]
    Lifecycle {
        component: String,
        reason: String,
    },
}

impl RouterError {
    pub(crate) fn store(reason: impl ToString) -> Self {
        Self::Store {
            reason: reason.to_string(),
        }
    }

    pub(crate) fn stream(reason: impl ToString) -> Self {
        Self::Stream {
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid(field: &str, reason: impl ToString) -> Self {
        Self::Config(ConfigError::InvalidValue {
            field: field.to_owned(),
            reason: reason.to_string(),
        })
    }
}

impl From<RouterError> for CriticalError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::Config(e) => CriticalError::Config(e),
            RouterError::Decode(e) => CriticalError::Decode(e),
            RouterError::Store { reason } => CriticalError::Component {
                component: "store",
                reason,
            },
            RouterError::Stream { reason } => CriticalError::Component {
                component: "stream",
                reason,
            },
            other @ (RouterError::Delivery { .. } | RouterError::Lifecycle { .. }) => {
                CriticalError::Component {
                    component: "router",
                    reason: other.to_string(),
                }
            }
        }
    }
}

//! Handler configuration document.
//!
//! One YAML document describes one handler:
//!
//! ```yaml
//! name: syslog-critical            # optional, defaults to the file stem
//! consumer_specification: syslog   # stream topic
//! static_filters:
//!   - kind: source_ip
//!     prefixes: ["10.0.0.0/8"]
//! formatter:
//!   kind: copy_field
//!   field: short_message
//! dynamic_filters:
//!   - kind: redis_exclude_pattern
//!     host: redis.local
//! senders:
//!   - kind: telegram
//!     token: "123:abc"
//!     receivers: [-1001234]
//! ```
//!
//! Every component is a [`ComponentSpec`]: a `kind` plus free-form
//! parameters that the component's factory validates.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, CriticalError};

/// Declarative description of one handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerSpec {
    /// Human readable name; also part of the consumer group id.
    #[serde(default)]
    pub name: String,
    /// Stream topic the handler consumes.
    pub consumer_specification: String,
    pub formatter: ComponentSpec,
    pub senders: Vec<ComponentSpec>,
    #[serde(default)]
    pub static_filters: Vec<ComponentSpec>,
    /// Dynamic filters shared by every sender.
    #[serde(default)]
    pub dynamic_filters: Vec<ComponentSpec>,
}

impl HandlerSpec {
    /// Loads and validates a handler document.
    ///
    /// An empty or missing `name` defaults to the file stem.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CriticalError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CriticalError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                CriticalError::Io(e)
            }
        })?;

        let mut spec = Self::parse(&content)?;
        if spec.name.trim().is_empty() {
            spec.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        spec.validate()?;

        tracing::debug!(
            path = %path.display(),
            name = %spec.name,
            senders = spec.senders.len(),
            "handler configuration loaded"
        );
        Ok(spec)
    }

    /// Parses a YAML document without validating it.
    pub fn parse(yaml: &str) -> Result<Self, CriticalError> {
        serde_yaml::from_str(yaml).map_err(|e| {
            CriticalError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Structural checks that do not need the component registry.
    pub fn validate(&self) -> Result<(), CriticalError> {
        if self.consumer_specification.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "consumer_specification".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        if self.senders.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "senders".to_owned(),
                reason: "at least one sender is required".to_owned(),
            }
            .into());
        }

        let components = std::iter::once(&self.formatter)
            .chain(&self.senders)
            .chain(&self.static_filters)
            .chain(&self.dynamic_filters);
        for component in components {
            if component.kind.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "kind".to_owned(),
                    reason: "must not be empty".to_owned(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Consumer group id, see [`consumer_group_id`].
    pub fn group_id(&self) -> String {
        consumer_group_id(&self.consumer_specification, &self.name)
    }
}

/// Consumer group id: `<topic>:<name>` with the name lower-cased and
/// stripped of everything but ASCII letters and digits.
pub fn consumer_group_id(topic: &str, name: &str) -> String {
    let name: String = name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    format!("{topic}:{name}")
}

/// `{kind, ...params}` description of a filter, formatter or sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub kind: String,
    #[serde(flatten)]
    pub params: serde_yaml::Mapping,
}

impl ComponentSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: serde_yaml::Mapping::new(),
        }
    }

    /// Adds a parameter; mostly useful in tests.
    pub fn with_param(mut self, key: &str, value: impl Into<serde_yaml::Value>) -> Self {
        self.params
            .insert(serde_yaml::Value::String(key.to_owned()), value.into());
        self
    }

    /// Deserializes the parameters into the component's typed settings.
    ///
    /// Errors name the kind so the operator can find the offending entry.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        serde_yaml::from_value(serde_yaml::Value::Mapping(self.params.clone())).map_err(|e| {
            ConfigError::InvalidValue {
                field: self.kind.clone(),
                reason: e.to_string(),
            }
        })
    }

    /// Removes and returns one parameter.
    pub fn take_param(&mut self, key: &str) -> Option<serde_yaml::Value> {
        self.params.remove(key)
    }
}

//! Full-message substring filters.

use serde::Deserialize;

use critical_core::{ComponentSpec, Record};

use super::StaticFilter;
use crate::error::RouterError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MessageBodyParams {
    pattern: String,
    #[serde(default)]
    exclude: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MessageBodyAnyParams {
    patterns: Vec<String>,
    #[serde(default)]
    exclude: bool,
}

/// Passes when `full_message` contains `pattern`, XOR `exclude`.
#[derive(Debug, Clone)]
pub struct MessageBodyFilter {
    pattern: String,
    exclude: bool,
}

impl MessageBodyFilter {
    pub const KIND: &'static str = "message_body";

    pub fn new(pattern: impl Into<String>, exclude: bool) -> Self {
        Self {
            pattern: pattern.into(),
            exclude,
        }
    }

    pub fn from_spec(spec: &ComponentSpec) -> Result<Self, RouterError> {
        let params: MessageBodyParams = spec.params()?;
        Ok(Self::new(params.pattern, params.exclude))
    }
}

impl StaticFilter for MessageBodyFilter {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn evaluate(&self, record: &Record) -> bool {
        record.full_message.contains(self.pattern.as_str()) != self.exclude
    }
}

/// Passes when `full_message` contains any of `patterns`, XOR `exclude`.
/// An empty pattern list matches nothing.
#[derive(Debug, Clone)]
pub struct MessageBodyAnyFilter {
    patterns: Vec<String>,
    exclude: bool,
}

impl MessageBodyAnyFilter {
    pub const KIND: &'static str = "message_body_any";

    pub fn new(patterns: Vec<String>, exclude: bool) -> Self {
        Self { patterns, exclude }
    }

    pub fn from_spec(spec: &ComponentSpec) -> Result<Self, RouterError> {
        let params: MessageBodyAnyParams = spec.params()?;
        Ok(Self::new(params.patterns, params.exclude))
    }
}

impl StaticFilter for MessageBodyAnyFilter {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn evaluate(&self, record: &Record) -> bool {
        let matched = self
            .patterns
            .iter()
            .any(|pattern| record.full_message.contains(pattern.as_str()));
        matched != self.exclude
    }
}

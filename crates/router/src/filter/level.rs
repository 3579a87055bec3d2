//! Syslog severity filter.

use serde::Deserialize;

use critical_core::{ComponentSpec, Record};

use super::StaticFilter;
use crate::error::RouterError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LevelParams {
    max_level: i64,
    #[serde(default)]
    exclude: bool,
}

/// Passes records at least as severe as `max_level` (syslog levels grow
/// as severity drops), XOR `exclude`.
#[derive(Debug, Clone)]
pub struct LevelFilter {
    max_level: i64,
    exclude: bool,
}

impl LevelFilter {
    pub const KIND: &'static str = "level";

    pub fn new(max_level: i64, exclude: bool) -> Self {
        Self { max_level, exclude }
    }

    pub fn from_spec(spec: &ComponentSpec) -> Result<Self, RouterError> {
        let params: LevelParams = spec.params()?;
        if !(0..=7).contains(&params.max_level) {
            return Err(RouterError::invalid(
                "level.max_level",
                format!("{} is outside the syslog range 0..=7", params.max_level),
            ));
        }
        Ok(Self::new(params.max_level, params.exclude))
    }
}

impl StaticFilter for LevelFilter {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn evaluate(&self, record: &Record) -> bool {
        (record.level <= self.max_level) != self.exclude
    }
}

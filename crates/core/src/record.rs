//! GELF record: the unit of work flowing through a handler.
//!
//! A record is decoded once per stream message and then only borrowed.
//! The six reserved GELF fields are mandatory; every other key of the
//! JSON object is kept verbatim in [`Record::additional`].

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;

/// Additional field carrying the address of the host that shipped the record.
pub const REMOTE_IP_FIELD: &str = "_gl2_remote_ip";

/// Fields every record must carry.
pub const RESERVED_FIELDS: [&str; 6] = [
    "version",
    "host",
    "short_message",
    "full_message",
    "timestamp",
    "level",
];

/// Largest stream payload accepted by [`Record::from_slice`] (1 MiB).
pub const MAX_RECORD_SIZE: usize = 1024 * 1024;

/// One decoded GELF message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub version: String,
    pub host: String,
    pub short_message: String,
    pub full_message: String,
    /// Seconds since the Unix epoch, possibly fractional.
    pub timestamp: f64,
    /// Syslog severity, lower is more severe.
    pub level: i64,
    /// Every non-reserved key, ordered by name.
    #[serde(flatten)]
    pub additional: BTreeMap<String, Value>,
}

impl Record {
    /// Decodes a record from a raw stream payload.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::TooLarge`] when the payload exceeds [`MAX_RECORD_SIZE`]
    /// - [`DecodeError::Malformed`] when the payload is not a JSON object
    ///   carrying all reserved fields with the right types
    pub fn from_slice(raw: &[u8]) -> Result<Self, DecodeError> {
        if raw.len() > MAX_RECORD_SIZE {
            return Err(DecodeError::TooLarge {
                size: raw.len(),
                max: MAX_RECORD_SIZE,
            });
        }

        serde_json::from_slice(raw).map_err(|e| DecodeError::Malformed {
            line: e.line(),
            column: e.column(),
            reason: e.to_string(),
        })
    }

    /// Decodes a record from an already parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        serde_json::from_value(value).map_err(|e| DecodeError::Malformed {
            line: 0,
            column: 0,
            reason: e.to_string(),
        })
    }

    /// Source address taken from [`REMOTE_IP_FIELD`].
    ///
    /// Returns `None` when the field is absent, not a string or not a valid
    /// IPv4/IPv6 address.
    pub fn source_ip(&self) -> Option<IpAddr> {
        self.additional
            .get(REMOTE_IP_FIELD)
            .and_then(Value::as_str)
            .and_then(|s| s.trim().parse().ok())
    }

    /// Looks a field up by name.
    ///
    /// Reserved names resolve to the reserved fields, anything else to the
    /// additional fields after [`normalize_field_name`]. String values are
    /// borrowed; other JSON values render as their JSON text.
    pub fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        let name = normalize_field_name(name);
        match name.as_ref() {
            "version" => Some(Cow::Borrowed(self.version.as_str())),
            "host" => Some(Cow::Borrowed(self.host.as_str())),
            "short_message" => Some(Cow::Borrowed(self.short_message.as_str())),
            "full_message" => Some(Cow::Borrowed(self.full_message.as_str())),
            "timestamp" => Some(Cow::Owned(self.timestamp.to_string())),
            "level" => Some(Cow::Owned(self.level.to_string())),
            other => self.additional.get(other).map(|value| match value {
                Value::String(s) => Cow::Borrowed(s.as_str()),
                other => Cow::Owned(other.to_string()),
            }),
        }
    }

    /// Record timestamp as a UTC date-time, if it is representable.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        if !self.timestamp.is_finite() {
            return None;
        }
        let secs = self.timestamp.floor();
        let nanos = ((self.timestamp - secs) * 1e9).round() as u32;
        DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
    }
}

/// Maps a configured field name onto the key stored in the record.
///
/// Configuration formats cannot always spell a leading underscore, so a
/// trailing one is accepted instead: `full_message_` becomes `_full_message`.
pub fn normalize_field_name(name: &str) -> Cow<'_, str> {
    match name.strip_suffix('_') {
        Some(stem) => Cow::Owned(format!("_{stem}")),
        None => Cow::Borrowed(name),
    }
}

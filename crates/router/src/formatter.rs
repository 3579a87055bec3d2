//! Formatters render a record into the outbound message text.
//!
//! A handler owns exactly one formatter and calls it once per accepted
//! record, so every sender and receiver sees the same text.

use serde::Deserialize;

use critical_core::{ComponentSpec, Record};

use crate::error::RouterError;

/// Pure record renderer.
pub trait Formatter: Send + Sync {
    fn kind(&self) -> &'static str;

    fn format(&self, record: &Record) -> String;
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CopyFieldParams {
    field: String,
}

/// Renders the value of a single field. Missing fields render empty.
#[derive(Debug, Clone)]
pub struct CopyFieldFormatter {
    field: String,
}

impl CopyFieldFormatter {
    pub const KIND: &'static str = "copy_field";

    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    pub fn from_spec(spec: &ComponentSpec) -> Result<Self, RouterError> {
        let params: CopyFieldParams = spec.params()?;
        if params.field.is_empty() {
            return Err(RouterError::invalid("copy_field.field", "must not be empty"));
        }
        Ok(Self::new(params.field))
    }
}

impl Formatter for CopyFieldFormatter {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn format(&self, record: &Record) -> String {
        record
            .field(&self.field)
            .map(|value| value.into_owned())
            .unwrap_or_default()
    }
}

/// Placeholder rendering the record timestamp as RFC 3339.
const DATETIME_PLACEHOLDER: &str = "@datetime";

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Field(String),
    DateTime,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateParams {
    template: String,
}

/// Substitutes `{field}` placeholders; `{{` and `}}` are literal braces.
#[derive(Debug, Clone)]
pub struct TemplateFormatter {
    segments: Vec<Segment>,
}

impl TemplateFormatter {
    pub const KIND: &'static str = "template";

    pub fn new(template: &str) -> Result<Self, RouterError> {
        Ok(Self {
            segments: parse_template(template)?,
        })
    }

    pub fn from_spec(spec: &ComponentSpec) -> Result<Self, RouterError> {
        let params: TemplateParams = spec.params()?;
        Self::new(&params.template)
    }
}

fn parse_template(template: &str) -> Result<Vec<Segment>, RouterError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => {
                            return Err(RouterError::invalid(
                                "template.template",
                                format!("unterminated placeholder '{{{name}'"),
                            ));
                        }
                    }
                }
                let name = name.trim();
                if name.is_empty() {
                    return Err(RouterError::invalid(
                        "template.template",
                        "empty placeholder '{}'",
                    ));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(if name == DATETIME_PLACEHOLDER {
                    Segment::DateTime
                } else {
                    Segment::Field(name.to_owned())
                });
            }
            '}' => {
                return Err(RouterError::invalid(
                    "template.template",
                    "unmatched '}', use '}}' for a literal brace",
                ));
            }
            c => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

impl Formatter for TemplateFormatter {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn format(&self, record: &Record) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => {
                    if let Some(value) = record.field(name) {
                        out.push_str(&value);
                    }
                }
                Segment::DateTime => {
                    if let Some(dt) = record.datetime() {
                        out.push_str(&dt.to_rfc3339());
                    }
                }
            }
        }
        out
    }
}

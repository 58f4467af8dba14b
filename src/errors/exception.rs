use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use thiserror::Error;

/// Whether a failure was the caller's fault or ours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExceptionType {
    Fail,
    Error,
}

impl ExceptionType {
    /// `Fail` for 4xx statuses, `Error` for everything else
    pub fn from_status(status_code: u16) -> Self {
        if status_code.to_string().starts_with('4') {
            Self::Fail
        } else {
            Self::Error
        }
    }
}

impl fmt::Display for ExceptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fail => write!(f, "Fail"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Name of the key a [`FieldMessage`] is serialized under.
///
/// Request-schema violations are keyed by `key`, persistence-schema
/// violations by `param`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLabel {
    Key,
    Param,
}

impl FieldLabel {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::Param => "param",
        }
    }
}

/// One entry of a multi-field validation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMessage {
    pub label: FieldLabel,
    pub field: String,
    pub message: String,
}

impl FieldMessage {
    pub fn key(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            label: FieldLabel::Key,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn param(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            label: FieldLabel::Param,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl Serialize for FieldMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(self.label.as_str(), &self.field)?;
        map.serialize_entry("message", &self.message)?;
        map.end()
    }
}

/// Message carried by an [`Exception`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ExceptionMessage {
    Text(String),
    Fields(Vec<FieldMessage>),
}

impl fmt::Display for ExceptionMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{}", text),
            Self::Fields(fields) => {
                let joined = fields
                    .iter()
                    .map(|entry| format!("{}: {}", entry.field, entry.message))
                    .collect::<Vec<_>>()
                    .join("; ");
                write!(f, "{}", joined)
            }
        }
    }
}

impl From<&str> for ExceptionMessage {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for ExceptionMessage {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<FieldMessage>> for ExceptionMessage {
    fn from(fields: Vec<FieldMessage>) -> Self {
        Self::Fields(fields)
    }
}

/// Canonical reason phrase for a status, or a generic fallback for
/// codes outside the HTTP range.
pub fn reason_phrase(status_code: u16) -> &'static str {
    StatusCode::from_u16(status_code)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("Internal Server Error")
}

/// Canonical error value produced by the translator and consumed by the renderer
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct Exception {
    pub message: ExceptionMessage,
    pub status_code: u16,
    /// Whether `message` is safe to show to a client
    pub is_public: bool,
    pub kind: String,
    pub exception_type: ExceptionType,
    pub code: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub stack: Option<String>,
}

impl Exception {
    /// Create an exception, deriving its type from the status code
    /// and capturing a backtrace if the runtime has them enabled.
    pub fn new(message: impl Into<ExceptionMessage>, status_code: u16) -> Self {
        Self {
            message: message.into(),
            status_code,
            is_public: true,
            kind: "Exception".to_string(),
            exception_type: ExceptionType::from_status(status_code),
            code: None,
            timestamp: Utc::now(),
            stack: capture_stack(),
        }
    }

    /// Exception whose message is the reason phrase of `status_code`
    pub fn from_status(status_code: u16) -> Self {
        Self::new(reason_phrase(status_code), status_code)
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_public(mut self, is_public: bool) -> Self {
        self.is_public = is_public;
        self
    }

    /// Override the derived type
    pub fn with_type(mut self, exception_type: ExceptionType) -> Self {
        self.exception_type = exception_type;
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn without_stack(mut self) -> Self {
        self.stack = None;
        self
    }
}

impl Default for Exception {
    fn default() -> Self {
        Self::from_status(500)
    }
}

fn capture_stack() -> Option<String> {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => Some(backtrace.to_string()),
        _ => None,
    }
}

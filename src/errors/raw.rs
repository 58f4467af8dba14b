//! Upstream error shapes the translator understands.
//!
//! Collaborators (persistence driver, request validator, handlers) report
//! failures in unrelated shapes. They are funneled into the closed
//! [`RawError`] enum here, once, so the translator can dispatch exhaustively.

use axum::extract::rejection::JsonRejection;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::exception::Exception;

/// Driver error code for a unique index violation
pub const DUPLICATE_KEY_CODE: i64 = 11000;

#[derive(Debug, Clone, Error)]
pub enum RawError {
    /// A value could not be cast to the field's declared type
    #[error("cast error on {}: {}", .0.path, .0.value)]
    Cast(CastError),

    #[error("duplicate key: {}", .0.message)]
    DuplicateKey(DuplicateKeyError),

    /// Violations reported by the request-schema validator
    #[error("request validation failed with {} violation(s)", .0.len())]
    SchemaValidation(Vec<ValidationDetail>),

    /// Violations reported by the persistence-schema validator, keyed by field
    #[error("persistence validation failed with {} violation(s)", .0.len())]
    PersistenceValidation(IndexMap<String, PersistenceViolation>),

    /// An exception raised deliberately by application code
    #[error(transparent)]
    Known(Exception),

    /// Anything else
    #[error("{}: {}", .0.name, .0.message)]
    Opaque(OpaqueError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastError {
    pub path: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateKeyError {
    /// Human-readable driver message
    pub message: String,
    /// Raw server-side message, when the driver exposes it separately
    pub errmsg: Option<String>,
    /// Structured offending key/value pairs, when the driver exposes them
    pub key_value: Option<IndexMap<String, Value>>,
}

impl DuplicateKeyError {
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errmsg: None,
            key_value: None,
        }
    }
}

/// One entry of a request-schema validator's detail list
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ValidationDetail {
    #[serde(default)]
    pub message: String,
    /// Rule identifier such as `string.min`
    #[serde(rename = "type", default)]
    pub rule: String,
    #[serde(default)]
    pub path: Vec<Value>,
    #[serde(default)]
    pub key: Option<Value>,
    #[serde(default)]
    pub context: ValidationContext,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ValidationContext {
    /// Array elements are keyed by index
    #[serde(default)]
    pub key: Option<Value>,
    #[serde(default)]
    pub label: Option<Value>,
    #[serde(default)]
    pub limit: Option<Value>,
    /// A serialized pattern object arrives as `{}`
    #[serde(default)]
    pub regex: Option<Value>,
}

impl ValidationDetail {
    pub fn new(rule: impl Into<String>, key: impl Into<String>, message: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: message.into(),
            rule: rule.into(),
            path: vec![Value::String(key.clone())],
            key: None,
            context: ValidationContext {
                key: Some(Value::String(key)),
                ..ValidationContext::default()
            },
        }
    }

    pub fn with_limit(mut self, limit: impl Into<Value>) -> Self {
        self.context.limit = Some(limit.into());
        self
    }

    pub fn with_regex(mut self, regex: impl Into<String>) -> Self {
        self.context.regex = Some(Value::String(regex.into()));
        self
    }

    /// Field name the violation refers to: the context key, then the
    /// top-level key, then the joined path.
    pub fn field(&self) -> String {
        let key = self
            .context
            .key
            .as_ref()
            .or(self.key.as_ref())
            .filter(|key| !key.is_null());
        if let Some(key) = key {
            return display_value(key);
        }
        self.path.iter().map(display_value).collect::<Vec<_>>().join(".")
    }
}

/// Strings render bare, everything else as JSON text
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceViolation {
    /// Full path of the offending field; falls back to the map key
    pub path: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueError {
    pub name: String,
    pub message: String,
    pub status_code: Option<u16>,
    pub code: Option<String>,
    pub stack: Option<String>,
}

impl OpaqueError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: "Error".to_string(),
            message: message.into(),
            status_code: None,
            code: None,
            stack: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

impl RawError {
    /// Wrap any error value that has no dedicated variant
    pub fn opaque(error: &(dyn std::error::Error + 'static)) -> Self {
        Self::Opaque(OpaqueError::new(error.to_string()))
    }

    /// Classify a loosely-typed error object as reported by a JSON-speaking
    /// collaborator. The first matching rule wins; anything unmatched is
    /// opaque.
    pub fn from_json(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            let message = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Self::Opaque(OpaqueError::new(message));
        };

        let name = object.get("name").and_then(Value::as_str).unwrap_or("Error");
        let message = object
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if name == "CastError" {
            return Self::Cast(CastError {
                path: string_field(object.get("path")),
                value: string_field(object.get("value")),
            });
        }

        let is_duplicate = object.get("code").and_then(Value::as_i64) == Some(DUPLICATE_KEY_CODE)
            || object.get("codeName").and_then(Value::as_str) == Some("DuplicateKey");
        if is_duplicate {
            let key_value = object.get("keyValue").and_then(Value::as_object).map(|map| {
                map.iter()
                    .map(|(field, value)| (field.clone(), value.clone()))
                    .collect()
            });
            return Self::DuplicateKey(DuplicateKeyError {
                message,
                errmsg: object.get("errmsg").and_then(Value::as_str).map(String::from),
                key_value,
            });
        }

        if name == "ValidationError" {
            if let Some(details) = object.get("details").and_then(Value::as_array) {
                let parsed: Result<Vec<ValidationDetail>, _> = details
                    .iter()
                    .map(|detail| serde_json::from_value(detail.clone()))
                    .collect();
                if let Ok(details) = parsed {
                    return Self::SchemaValidation(details);
                }
            }

            if let Some(errors) = object.get("errors").and_then(Value::as_object) {
                let violations = errors
                    .iter()
                    .map(|(field, suberror)| {
                        let path = suberror
                            .pointer("/properties/path")
                            .or_else(|| suberror.get("path"))
                            .and_then(Value::as_str)
                            .map(String::from);
                        let message = suberror
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        (field.clone(), PersistenceViolation { path, message })
                    })
                    .collect();
                return Self::PersistenceValidation(violations);
            }
        }

        Self::Opaque(OpaqueError {
            name: name.to_string(),
            message,
            status_code: object
                .get("statusCode")
                .or_else(|| object.get("status"))
                .and_then(Value::as_u64)
                .and_then(|status| u16::try_from(status).ok()),
            code: object.get("code").map(|code| match code {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            stack: object.get("stack").and_then(Value::as_str).map(String::from),
        })
    }
}

fn string_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

impl From<Exception> for RawError {
    fn from(exception: Exception) -> Self {
        Self::Known(exception)
    }
}

impl From<anyhow::Error> for RawError {
    fn from(error: anyhow::Error) -> Self {
        Self::Opaque(OpaqueError::new(format!("{:#}", error)))
    }
}

/// A body that fails to parse is a request-schema violation on `body`
impl From<JsonRejection> for RawError {
    fn from(rejection: JsonRejection) -> Self {
        Self::SchemaValidation(vec![ValidationDetail::new(
            "object.base",
            "body",
            rejection.body_text(),
        )])
    }
}

//! The JSON envelope every caller receives.
//!
//! Success: `{"success": true, "message"?, "data"?, ...extra}`.
//! Failure: `{"success": false, "error": ..., ...extra}`.
//! An envelope with nothing to say is sent as `204 No Content`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::errors::exception::reason_phrase;
use crate::errors::raw::{OpaqueError, RawError};

/// Keys owned by the envelope itself
pub const RESERVED_KEYS: [&str; 4] = ["success", "message", "data", "error"];

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("extra key `{0}` collides with a reserved envelope key")]
    ReservedKey(String),

    #[error("failed to serialize envelope data: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Building an envelope wrong is a programming error, never the client's
impl From<EnvelopeError> for RawError {
    fn from(error: EnvelopeError) -> Self {
        RawError::Opaque(OpaqueError::new(error.to_string()).with_name("EnvelopeError"))
    }
}

/// Top-level fields merged into an envelope next to the reserved ones
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extra(Map<String, Value>);

impl Extra {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), EnvelopeError> {
        let key = key.into();
        if RESERVED_KEYS.contains(&key.as_str()) {
            return Err(EnvelopeError::ReservedKey(key));
        }
        self.0.insert(key, value.into());
        Ok(())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<Self, EnvelopeError> {
        self.insert(key, value)?;
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    success: bool,
    status: u16,
    message: Option<Value>,
    data: Option<Value>,
    extra: Extra,
}

impl Envelope {
    /// Success envelope. Nulls count as absent.
    pub fn respond(status: u16, message: Option<Value>, data: Option<Value>, extra: Extra) -> Self {
        Self {
            success: true,
            status,
            message: message.filter(|m| !m.is_null()),
            data: data.filter(|d| !d.is_null()),
            extra,
        }
    }

    /// Failure envelope; the message goes under `error`
    pub fn fail(status: u16, message: Option<Value>, extra: Extra) -> Self {
        Self {
            success: false,
            status,
            message: message.filter(|m| !m.is_null()),
            data: None,
            extra,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_message(mut self, message: impl Into<Value>) -> Self {
        self.message = Some(message.into()).filter(|m| !m.is_null());
        self
    }

    /// Ignored on failure envelopes
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        if self.success {
            self.data = Some(data.into()).filter(|d| !d.is_null());
        }
        self
    }

    pub fn with_serialized<T: Serialize>(self, data: &T) -> Result<Self, EnvelopeError> {
        let value = serde_json::to_value(data)?;
        Ok(self.with_data(value))
    }

    pub fn with_extra(mut self, extra: Extra) -> Self {
        self.extra = extra;
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn is_no_content(&self) -> bool {
        self.message.is_none() && self.data.is_none()
    }

    /// Status actually sent; absent content always wins
    pub fn status(&self) -> StatusCode {
        if self.is_no_content() {
            return StatusCode::NO_CONTENT;
        }
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// JSON body, or `None` when the envelope is sent as no content
    pub fn body(&self) -> Option<Value> {
        if self.is_no_content() {
            return None;
        }

        let mut body = Map::new();
        body.insert("success".to_string(), Value::Bool(self.success));
        if self.success {
            if let Some(message) = &self.message {
                body.insert("message".to_string(), message.clone());
            }
            if let Some(data) = &self.data {
                body.insert("data".to_string(), data.clone());
            }
        } else if let Some(message) = &self.message {
            body.insert("error".to_string(), message.clone());
        }
        for (key, value) in &self.extra.0 {
            body.insert(key.clone(), value.clone());
        }
        Some(Value::Object(body))
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let status = self.status();
        match self.body() {
            Some(body) => (status, Json(body)).into_response(),
            None => status.into_response(),
        }
    }
}

fn failure(status: u16) -> Envelope {
    Envelope::fail(status, Some(Value::from(reason_phrase(status))), Extra::new())
}

/// Named shortcuts with conventional status and message defaults
impl Envelope {
    pub fn ok(message: impl Into<Value>) -> Self {
        Self::respond(200, Some(message.into()), None, Extra::new())
    }

    pub fn created(message: impl Into<Value>) -> Self {
        Self::respond(201, Some(message.into()), None, Extra::new())
    }

    pub fn no_content() -> Self {
        Self::respond(204, None, None, Extra::new())
    }

    pub fn bad_request() -> Self {
        failure(400)
    }

    pub fn unauthorized() -> Self {
        failure(401)
    }

    pub fn forbidden() -> Self {
        failure(403)
    }

    pub fn not_found() -> Self {
        failure(404)
    }

    pub fn method_not_allowed() -> Self {
        failure(405)
    }

    pub fn conflict() -> Self {
        failure(409)
    }

    pub fn unprocessable_entity() -> Self {
        failure(422)
    }

    pub fn too_many_requests() -> Self {
        failure(429)
    }

    pub fn internal_server_error() -> Self {
        failure(500)
    }

    pub fn bad_gateway() -> Self {
        failure(502)
    }

    pub fn service_unavailable() -> Self {
        failure(503)
    }
}

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use super::middleware::AppError;
use crate::disclosure::DisclosureMode;
use crate::errors::{
    CastError, DuplicateKeyError, Exception, PersistenceViolation, RawError, ValidationDetail,
};
use crate::response::{Envelope, Extra};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub mode: DisclosureMode,
    pub started_at: Instant,
}

type ApiResult = Result<Envelope, AppError>;

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Envelope {
    Envelope::ok("healthy").with_data(json!({
        "service": "error-contract",
        "version": env!("CARGO_PKG_VERSION"),
        "mode": state.mode.to_string(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

/// Answer for every unknown route
pub async fn fallback() -> Envelope {
    Envelope::not_found()
}

pub async fn demo_ok() -> Envelope {
    Envelope::ok("done").with_data(json!({"id": 1}))
}

/// Nothing to say: sent as 204 whatever status was asked for
pub async fn demo_empty() -> Envelope {
    Envelope::respond(200, None, None, Extra::new())
}

pub async fn demo_paginated() -> ApiResult {
    let extra = Extra::new().with("page", 1)?.with("limit", 2)?.with("total", 2)?;
    Ok(Envelope::ok("listed")
        .with_data(json!([{"id": 1}, {"id": 2}]))
        .with_extra(extra))
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

const PASSWORD_MIN: usize = 8;
const NAME_MAX: usize = 30;

/// Create a user, reporting every invalid field at once
pub async fn demo_create_user(body: Result<Json<CreateUser>, JsonRejection>) -> ApiResult {
    let Json(user) = body?;

    let mut details = Vec::new();
    if user.name.is_empty() {
        details.push(ValidationDetail::new(
            "string.empty",
            "name",
            "\"name\" is not allowed to be empty",
        ));
    } else if user.name.chars().count() > NAME_MAX {
        details.push(
            ValidationDetail::new("string.max", "name", "\"name\" is too long").with_limit(NAME_MAX),
        );
    }
    if !user.email.contains('@') {
        details.push(ValidationDetail::new(
            "string.email",
            "email",
            "\"email\" must be a valid email",
        ));
    }
    if user.password.chars().count() < PASSWORD_MIN {
        details.push(
            ValidationDetail::new("string.min", "password", "\"password\" is too short")
                .with_limit(PASSWORD_MIN),
        );
    }
    if !details.is_empty() {
        return Err(RawError::SchemaValidation(details).into());
    }

    Ok(Envelope::created("user created").with_data(json!({
        "name": user.name,
        "email": user.email,
    })))
}

/// Look a user up by a 24-character hex object id
pub async fn demo_get_user(Path(id): Path<String>) -> ApiResult {
    let is_object_id = id.len() == 24 && id.chars().all(|c| c.is_ascii_hexdigit());
    if !is_object_id {
        return Err(RawError::Cast(CastError {
            path: "_id".to_string(),
            value: id,
        })
        .into());
    }
    Ok(Envelope::ok("user found").with_data(json!({"id": id})))
}

pub async fn demo_duplicate() -> ApiResult {
    Err(RawError::DuplicateKey(DuplicateKeyError::from_message(
        "E11000 duplicate key error collection: app.users index: mobile_1 dup key: { mobile: \"09015906120\" }",
    ))
    .into())
}

pub async fn demo_persistence_validation() -> ApiResult {
    let mut violations = IndexMap::new();
    violations.insert(
        "email".to_string(),
        PersistenceViolation {
            path: Some("email".to_string()),
            message: "Path `email` is required.".to_string(),
        },
    );
    violations.insert(
        "age".to_string(),
        PersistenceViolation {
            path: Some("age".to_string()),
            message: "Path `age` (12) is less than minimum allowed value (18).".to_string(),
        },
    );
    Err(RawError::PersistenceValidation(violations).into())
}

pub async fn demo_forbidden() -> ApiResult {
    Err(Exception::new("CORS Error", 403).with_kind("CorsError").into())
}

pub async fn demo_internal() -> ApiResult {
    let config: Value = serde_json::from_str("{ not json")
        .map_err(|e| anyhow::anyhow!("failed to read feature flags: {}", e))?;
    Ok(Envelope::ok("unreachable").with_data(config))
}

/// Classify a loosely-typed error object exactly as a collaborator reported it
pub async fn demo_raw(body: Result<Json<Value>, JsonRejection>) -> ApiResult {
    let Json(error) = body?;
    Err(RawError::from_json(&error).into())
}

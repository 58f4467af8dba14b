use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::codes::ErrorCategory;
use super::exception::{reason_phrase, Exception, FieldMessage};
use super::raw::{CastError, DuplicateKeyError, OpaqueError, RawError};
use super::validation::{render_persistence_violations, render_schema_details};

lazy_static! {
    /// First single- or double-quoted token, escapes allowed inside
    static ref QUOTED_TOKEN: Regex =
        Regex::new(r#""(?:\\.|[^"\\])*"|'(?:\\.|[^'\\])*'"#).expect("valid quoted token regex");
}

/// Status codes for the categories whose status is a deployment decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslatorPolicy {
    pub duplicate_key_status: u16,
    pub cast_status: u16,
}

impl Default for TranslatorPolicy {
    fn default() -> Self {
        Self {
            duplicate_key_status: ErrorCategory::ConflictError.status_code(),
            cast_status: ErrorCategory::UpstreamCastError.status_code(),
        }
    }
}

/// Maps every [`RawError`] to an [`Exception`]. Stateless apart from its policy.
#[derive(Debug, Clone, Default)]
pub struct ErrorTranslator {
    policy: TranslatorPolicy,
}

impl ErrorTranslator {
    pub fn new(policy: TranslatorPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> TranslatorPolicy {
        self.policy
    }

    /// Category a raw error falls into before translation.
    /// Deliberate application exceptions are categorized by visibility.
    pub fn categorize(raw: &RawError) -> ErrorCategory {
        match raw {
            RawError::Cast(_) => ErrorCategory::UpstreamCastError,
            RawError::DuplicateKey(_) => ErrorCategory::ConflictError,
            RawError::SchemaValidation(_) | RawError::PersistenceValidation(_) => {
                ErrorCategory::ClientValidationError
            }
            RawError::Known(exception) if exception.is_public && exception.status_code < 500 => {
                ErrorCategory::ClientValidationError
            }
            RawError::Known(_) | RawError::Opaque(_) => ErrorCategory::InternalError,
        }
    }

    pub fn translate(&self, raw: RawError) -> Exception {
        match raw {
            RawError::Cast(cast) => self.translate_cast(cast),
            RawError::DuplicateKey(duplicate) => self.translate_duplicate_key(duplicate),
            RawError::SchemaValidation(details) => {
                validation_exception(render_schema_details(&details))
            }
            RawError::PersistenceValidation(violations) => {
                validation_exception(render_persistence_violations(&violations))
            }
            RawError::Known(exception) => exception,
            RawError::Opaque(opaque) => translate_opaque(opaque),
        }
    }

    fn translate_cast(&self, cast: CastError) -> Exception {
        let message = format!("Invalid {}: {}.", cast.path, cast.value);
        Exception::new(message, self.policy.cast_status)
            .with_kind(ErrorCategory::UpstreamCastError.kind())
    }

    fn translate_duplicate_key(&self, duplicate: DuplicateKeyError) -> Exception {
        let message = match duplicate_key_capture(&duplicate) {
            Some((field, value)) => format!(
                "Duplicate field: '{}' - value: '{}'. Please use another value!",
                field, value
            ),
            None => duplicate.errmsg.unwrap_or(duplicate.message),
        };
        Exception::new(message, self.policy.duplicate_key_status)
            .with_kind(ErrorCategory::ConflictError.kind())
    }
}

fn validation_exception(fields: Vec<FieldMessage>) -> Exception {
    Exception::new(fields, ErrorCategory::ClientValidationError.status_code())
        .with_kind(ErrorCategory::ClientValidationError.kind())
}

fn translate_opaque(opaque: OpaqueError) -> Exception {
    let status_code = opaque
        .status_code
        .unwrap_or(ErrorCategory::InternalError.status_code());
    let message = if opaque.message.is_empty() {
        reason_phrase(status_code).to_string()
    } else {
        opaque.message
    };

    let mut exception = Exception::new(message, status_code)
        .with_kind(opaque.name)
        .with_public(false);
    exception.code = opaque.code;
    if let Some(stack) = opaque.stack {
        exception.stack = Some(stack);
    }
    exception
}

/// Offending field and value of a duplicate-key violation.
///
/// Structured key/value metadata wins; otherwise the driver text is parsed.
fn duplicate_key_capture(duplicate: &DuplicateKeyError) -> Option<(String, String)> {
    if let Some((field, value)) = duplicate
        .key_value
        .as_ref()
        .and_then(|pairs| pairs.iter().next())
    {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Some((field.clone(), value));
    }

    let raw = duplicate.errmsg.as_deref().unwrap_or(&duplicate.message);
    parse_duplicate_key(&duplicate.message, raw)
}

/// Parses `... collection: db.users index: mobile_1 dup key: { mobile: "0901" }`.
///
/// The field comes from `message`, the value from the first quoted token of `raw`.
pub fn parse_duplicate_key(message: &str, raw: &str) -> Option<(String, String)> {
    let segment = message.split('.').nth(1)?;
    let segment = segment.split(" dup key").next()?;
    let index = segment.split("index: ").nth(1)?;
    let field = index[..index.rfind('_')?].trim();
    if field.is_empty() {
        return None;
    }

    let token = QUOTED_TOKEN.find(raw)?.as_str();
    let value = token[1..token.len() - 1].replace('"', "");

    Some((field.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::exception::{ExceptionMessage, ExceptionType};
    use crate::errors::raw::{PersistenceViolation, ValidationDetail};
    use indexmap::IndexMap;
    use serde_json::json;

    const DUP_MESSAGE: &str =
        "E11000 duplicate key error collection: shop.users index: mobile_1 dup key: { mobile: \"0901\" }";

    #[test]
    fn test_cast_error() {
        let exception = ErrorTranslator::default().translate(RawError::Cast(CastError {
            path: "id".to_string(),
            value: "abc".to_string(),
        }));
        assert_eq!(exception.message, ExceptionMessage::Text("Invalid id: abc.".into()));
        assert_eq!(exception.status_code, 400);
        assert_eq!(exception.kind, "CastError");
        assert_eq!(exception.exception_type, ExceptionType::Fail);
        assert!(exception.is_public);
    }

    #[test]
    fn test_duplicate_key_from_text() {
        let exception = ErrorTranslator::default()
            .translate(RawError::DuplicateKey(DuplicateKeyError::from_message(DUP_MESSAGE)));
        assert_eq!(
            exception.message,
            ExceptionMessage::Text(
                "Duplicate field: 'mobile' - value: '0901'. Please use another value!".into()
            )
        );
        assert_eq!(exception.status_code, 400);
        assert_eq!(exception.kind, "DuplicateKey");
    }

    #[test]
    fn test_parse_duplicate_key_parts() {
        assert_eq!(
            parse_duplicate_key(DUP_MESSAGE, DUP_MESSAGE),
            Some(("mobile".to_string(), "0901".to_string()))
        );
    }

    #[test]
    fn test_parse_duplicate_key_compound_suffix() {
        let message = "E11000 duplicate key error collection: app.accounts index: user_email_1 dup key: { user_email: 'a@b.co' }";
        assert_eq!(
            parse_duplicate_key(message, message),
            Some(("user_email".to_string(), "a@b.co".to_string()))
        );
    }

    #[test]
    fn test_duplicate_key_prefers_structured_metadata() {
        let mut key_value = IndexMap::new();
        key_value.insert("email".to_string(), json!("x@y.z"));
        let exception = ErrorTranslator::default().translate(RawError::DuplicateKey(
            DuplicateKeyError {
                message: "unparseable".to_string(),
                errmsg: None,
                key_value: Some(key_value),
            },
        ));
        assert_eq!(
            exception.message.to_string(),
            "Duplicate field: 'email' - value: 'x@y.z'. Please use another value!"
        );
    }

    #[test]
    fn test_duplicate_key_unparseable_falls_back_to_raw() {
        let exception = ErrorTranslator::default().translate(RawError::DuplicateKey(
            DuplicateKeyError {
                message: "E11000 duplicate key error".to_string(),
                errmsg: Some("E11000 duplicate key error (raw)".to_string()),
                key_value: None,
            },
        ));
        assert_eq!(exception.message.to_string(), "E11000 duplicate key error (raw)");
        assert_eq!(exception.status_code, 400);
    }

    #[test]
    fn test_conflict_status_is_configurable() {
        let translator = ErrorTranslator::new(TranslatorPolicy {
            duplicate_key_status: 409,
            cast_status: 409,
        });
        let duplicate =
            translator.translate(RawError::DuplicateKey(DuplicateKeyError::from_message(DUP_MESSAGE)));
        assert_eq!(duplicate.status_code, 409);
        assert_eq!(duplicate.exception_type, ExceptionType::Fail);

        let cast = translator.translate(RawError::Cast(CastError {
            path: "id".into(),
            value: "1".into(),
        }));
        assert_eq!(cast.status_code, 409);
    }

    #[test]
    fn test_schema_validation_aggregates_every_detail() {
        let details = vec![
            ValidationDetail::new("string.empty", "name", "\"name\" is not allowed to be empty"),
            ValidationDetail::new("string.min", "password", "\"password\" too short").with_limit(8),
            ValidationDetail::new("number.base", "age", "\"age\" must be a 'number'"),
        ];
        let exception = ErrorTranslator::default().translate(RawError::SchemaValidation(details));
        assert_eq!(exception.status_code, 400);
        match exception.message {
            ExceptionMessage::Fields(fields) => {
                assert_eq!(fields.len(), 3);
                assert_eq!(fields[0].field, "name");
                assert_eq!(fields[1].message, "password should have at least 8 characters.");
                assert_eq!(fields[2].message, "age must be a number");
                for entry in &fields {
                    assert!(!entry.message.contains('"'));
                    assert!(!entry.message.contains('\''));
                }
            }
            other => panic!("expected field list, got {:?}", other),
        }
    }

    #[test]
    fn test_persistence_validation() {
        let mut violations = IndexMap::new();
        violations.insert(
            "name".to_string(),
            PersistenceViolation {
                path: Some("profile.name".to_string()),
                message: "Path `name` is required.".to_string(),
            },
        );
        let exception =
            ErrorTranslator::default().translate(RawError::PersistenceValidation(violations));
        assert_eq!(exception.status_code, 400);
        assert_eq!(
            serde_json::to_value(&exception.message).unwrap(),
            json!([{"param": "profile.name", "message": "Path `name` is required."}])
        );
    }

    #[test]
    fn test_opaque_is_never_public() {
        let exception = ErrorTranslator::default().translate(RawError::Opaque(
            OpaqueError::new("connection refused").with_name("MongoNetworkError"),
        ));
        assert_eq!(exception.status_code, 500);
        assert!(!exception.is_public);
        assert_eq!(exception.kind, "MongoNetworkError");
        assert_eq!(exception.exception_type, ExceptionType::Error);
    }

    #[test]
    fn test_opaque_preserves_status() {
        let exception = ErrorTranslator::default()
            .translate(RawError::Opaque(OpaqueError::new("").with_status(418)));
        assert_eq!(exception.status_code, 418);
        assert_eq!(exception.message.to_string(), "I'm a teapot");
        assert!(!exception.is_public);
    }

    #[test]
    fn test_known_exception_passes_through() {
        let original = Exception::new("CORS Error", 403).with_kind("CorsError");
        let exception = ErrorTranslator::default().translate(RawError::Known(original));
        assert_eq!(exception.status_code, 403);
        assert_eq!(exception.kind, "CorsError");
        assert!(exception.is_public);
    }

    #[test]
    fn test_categorize() {
        assert_eq!(
            ErrorTranslator::categorize(&RawError::DuplicateKey(DuplicateKeyError::from_message(""))),
            ErrorCategory::ConflictError
        );
        assert_eq!(
            ErrorTranslator::categorize(&RawError::Opaque(OpaqueError::new("x"))),
            ErrorCategory::InternalError
        );
    }
}

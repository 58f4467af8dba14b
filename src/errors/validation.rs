use indexmap::IndexMap;
use serde_json::Value;

use super::exception::FieldMessage;
use super::raw::{display_value, PersistenceViolation, ValidationDetail};

/// Rewrite request-schema violations into `{key, message}` entries, one per detail.
pub fn render_schema_details(details: &[ValidationDetail]) -> Vec<FieldMessage> {
    details
        .iter()
        .map(|detail| {
            let key = detail.field();
            let message = rule_message(detail, &key)
                .unwrap_or_else(|| strip_quotes(&detail.message));
            FieldMessage::key(key, message)
        })
        .collect()
}

/// One `{param, message}` entry per persistence violation, in field order
pub fn render_persistence_violations(
    violations: &IndexMap<String, PersistenceViolation>,
) -> Vec<FieldMessage> {
    violations
        .iter()
        .map(|(field, violation)| {
            let param = violation.path.clone().unwrap_or_else(|| field.clone());
            FieldMessage::param(param, violation.message.clone())
        })
        .collect()
}

fn rule_message(detail: &ValidationDetail, key: &str) -> Option<String> {
    let limit = detail.context.limit.as_ref().map(display_value);
    let regex = detail.context.regex.as_ref().and_then(Value::as_str);

    let message = match detail.rule.as_str() {
        "string.empty" => format!("{} should not be empty.", key),
        "string.min" => format!("{} should have at least {} characters.", key, limit?),
        "string.max" => format!("{} should have at most {} characters.", key, limit?),
        "string.pattern.base" => {
            format!("{} fails to match the required pattern: {}", key, regex?)
        }
        "string.email" => format!("{} must be a valid email.", key),
        _ => return None,
    };
    Some(message)
}

fn strip_quotes(message: &str) -> String {
    message.replace(['"', '\''], "")
}

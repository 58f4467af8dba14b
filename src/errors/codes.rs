use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse categories every translated error falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Request payload failed schema or persistence validation
    ClientValidationError,

    /// Unique constraint violated in the persistence layer
    ConflictError,

    /// Persistence layer could not cast a field to its declared type
    UpstreamCastError,

    /// Anything unrecognized
    InternalError,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientValidationError => write!(f, "CLIENT_VALIDATION_ERROR"),
            Self::ConflictError => write!(f, "CONFLICT_ERROR"),
            Self::UpstreamCastError => write!(f, "UPSTREAM_CAST_ERROR"),
            Self::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}

impl ErrorCategory {
    /// Default HTTP status for this category.
    ///
    /// Conflict and cast errors are overridable through [`TranslatorPolicy`].
    ///
    /// [`TranslatorPolicy`]: super::translator::TranslatorPolicy
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ClientValidationError => 400,
            Self::ConflictError => 400,
            Self::UpstreamCastError => 400,
            Self::InternalError => 500,
        }
    }

    /// Whether messages in this category may reach a client
    pub fn is_public(&self) -> bool {
        !matches!(self, Self::InternalError)
    }

    /// The `kind` tag stamped on exceptions of this category
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClientValidationError => "ValidationError",
            Self::ConflictError => "DuplicateKey",
            Self::UpstreamCastError => "CastError",
            Self::InternalError => "Error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_status_codes() {
        assert_eq!(ErrorCategory::ClientValidationError.status_code(), 400);
        assert_eq!(ErrorCategory::ConflictError.status_code(), 400);
        assert_eq!(ErrorCategory::UpstreamCastError.status_code(), 400);
        assert_eq!(ErrorCategory::InternalError.status_code(), 500);
    }

    #[test]
    fn test_only_internal_is_private() {
        assert!(ErrorCategory::ClientValidationError.is_public());
        assert!(ErrorCategory::ConflictError.is_public());
        assert!(ErrorCategory::UpstreamCastError.is_public());
        assert!(!ErrorCategory::InternalError.is_public());
    }

    #[test]
    fn test_category_serialization() {
        let json = serde_json::to_string(&ErrorCategory::ConflictError).unwrap();
        assert_eq!(json, "\"CONFLICT_ERROR\"");
        assert_eq!(ErrorCategory::ConflictError.to_string(), "CONFLICT_ERROR");
    }
}

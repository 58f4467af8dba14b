//! Error normalization: upstream shapes in, one canonical exception out

pub mod codes;
pub mod exception;
pub mod raw;
pub mod translator;
pub mod validation;

pub use codes::ErrorCategory;
pub use exception::{Exception, ExceptionMessage, ExceptionType, FieldLabel, FieldMessage};
pub use raw::{
    CastError, DuplicateKeyError, OpaqueError, PersistenceViolation, RawError, ValidationDetail,
};
pub use translator::{ErrorTranslator, TranslatorPolicy};

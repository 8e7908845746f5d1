use std::borrow::Cow;

use thiserror::Error;

/// Top-level error type returned by tagvault stores and passes.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Manifest or request validation failed for one or more fields.
    #[error("validation failed")]
    Validation(#[from] ValidationError),

    /// Underlying Redis command failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A stored document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading or writing a file-backed store failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The type registry adapter could not be consulted at all.
    #[error("type registry unavailable: {message}")]
    AdapterUnavailable { message: String },

    /// Optimistic concurrency guard detected that the store moved on.
    #[error("version conflict (expected {expected:?}, actual {actual:?})")]
    VersionConflict { expected: Option<u64>, actual: Option<u64> },

    /// A record or association referenced by a plan does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A plan would break a uniqueness invariant of the registry.
    #[error("unique constraint violation on {constraint}: {values:?} already held by '{existing_id}'")]
    UniqueConstraintViolation {
        constraint: &'static str,
        values: Vec<String>,
        existing_id: String,
    },

    /// Invalid input supplied to a store or pass operation.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("{message}")]
    Other { message: Cow<'static, str> },
}

impl RegistryError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn adapter(message: impl Into<String>) -> Self {
        Self::AdapterUnavailable {
            message: message.into(),
        }
    }
}

/// Collection of validation issues encountered while loading a schema manifest.
#[derive(Debug, Error)]
#[error("validation errors: {issues:?}")]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new<I>(issues: I) -> Self
    where
        I: IntoIterator<Item = ValidationIssue>,
    {
        Self {
            issues: issues.into_iter().collect(),
        }
    }

    /// Convenience helper for constructing a single-field validation error.
    pub fn single(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new([ValidationIssue::new(field, code, message)])
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Detailed validation failure for a single field or logical path.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

pub type ValidationResult<T> = Result<T, ValidationError>;

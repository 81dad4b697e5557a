//! Error types for Owner Console.
//!
//! `OwnerError` is the one error shape every service returns. It carries a
//! stable machine code, an HTTP status, and whether a retry could help.

use std::collections::BTreeMap;
use thiserror::Error;

/// The main error type for Owner Console operations.
#[derive(Debug, Error)]
pub enum OwnerError {
    // ==================== Validation Errors ====================
    /// A required field is missing.
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// A field value is invalid.
    #[error("Invalid field value for '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    /// A form failed validation; messages are grouped per field.
    #[error("Validation failed: {}", summarize(.errors))]
    Validation {
        errors: BTreeMap<String, Vec<String>>,
    },

    /// A filter string could not be parsed.
    #[error("Invalid filter at offset {offset}: {reason}")]
    InvalidFilter { offset: usize, reason: String },

    /// The collection name is not known.
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// A status change is not allowed from the current status.
    #[error("Cannot move {entity} from '{from}' to '{to}'")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    /// The operation conflicts with the current state of a record.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    // ==================== Storage Errors ====================
    /// The requested record was not found.
    #[error("Record not found: {entity} with {key}={value}")]
    NotFound {
        entity: String,
        key: String,
        value: String,
    },

    /// A unique constraint was violated.
    #[error("Duplicate entry: {entity} with {field}={value} already exists")]
    DuplicateEntry {
        entity: String,
        field: String,
        value: String,
    },

    /// A storage operation failed.
    #[error("Database error: {message}")]
    DatabaseError { message: String },

    // ==================== Access Errors ====================
    /// Missing or wrong credentials.
    #[error("Unauthorized")]
    Unauthorized,

    /// Credentials valid but not allowed.
    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    // ==================== Upstream Errors ====================
    /// A network call failed before a response arrived.
    #[error("Network error: {message}")]
    Network { message: String },

    /// A network call timed out.
    #[error("Request timeout")]
    Timeout,

    /// An upstream service answered with an error status.
    #[error("Upstream {service} returned {status}: {message}")]
    Upstream {
        service: String,
        status: u16,
        message: String,
    },

    /// Too many requests have been made.
    #[error("Rate limit exceeded. Try again in {retry_after_seconds} seconds")]
    RateLimitExceeded { retry_after_seconds: u64 },

    // ==================== Configuration Errors ====================
    /// The configuration is invalid.
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    // ==================== Internal Errors ====================
    /// Serialization/deserialization failed.
    #[error("Serialization error: {message}")]
    SerializationError { message: String },

    /// An internal error occurred.
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl OwnerError {
    /// Creates a new not found error.
    pub fn not_found(entity: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            key: key.into(),
            value: value.into(),
        }
    }

    /// Creates a new duplicate entry error.
    pub fn duplicate(entity: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::DuplicateEntry {
            entity: entity.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates a new invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new invalid transition error.
    pub fn transition(entity: impl Into<String>, from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            entity: entity.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Creates a new conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::DatabaseError {
            message: message.into(),
        }
    }

    /// Creates a new network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates a new upstream error.
    pub fn upstream(service: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            service: service.into(),
            status,
            message: message.into(),
        }
    }

    /// Creates a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Creates a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Returns true when repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout | Self::RateLimitExceeded { .. } => true,
            Self::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns a stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing_field",
            Self::InvalidField { .. } => "invalid_field",
            Self::Validation { .. } => "validation_failed",
            Self::InvalidFilter { .. } => "invalid_filter",
            Self::UnknownCollection(_) => "unknown_collection",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Conflict { .. } => "conflict",
            Self::NotFound { .. } => "not_found",
            Self::DuplicateEntry { .. } => "duplicate_entry",
            Self::DatabaseError { .. } => "database_error",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden { .. } => "forbidden",
            Self::Network { .. } => "network_error",
            Self::Timeout => "timeout",
            Self::Upstream { .. } => "upstream_error",
            Self::RateLimitExceeded { .. } => "rate_limited",
            Self::ConfigurationError { .. } => "configuration_error",
            Self::SerializationError { .. } => "serialization_error",
            Self::InternalError { .. } => "internal_error",
        }
    }

    /// Returns an HTTP status code appropriate for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } | Self::UnknownCollection(_) => 404,
            Self::DuplicateEntry { .. } | Self::Conflict { .. } | Self::InvalidTransition { .. } => 409,
            Self::MissingField { .. }
            | Self::InvalidField { .. }
            | Self::Validation { .. } => 422,
            Self::InvalidFilter { .. } => 400,
            Self::RateLimitExceeded { .. } => 429,
            Self::Network { .. } | Self::Upstream { .. } => 502,
            Self::Timeout => 504,
            _ => 500,
        }
    }
}

fn summarize(errors: &BTreeMap<String, Vec<String>>) -> String {
    errors
        .iter()
        .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A Result type alias using OwnerError.
pub type OwnerResult<T> = Result<T, OwnerError>;

impl From<serde_json::Error> for OwnerError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError {
            message: err.to_string(),
        }
    }
}

impl From<OwnerError> for owner_events::EventError {
    fn from(err: OwnerError) -> Self {
        owner_events::EventError::Hook(err.to_string())
    }
}

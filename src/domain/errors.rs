//! Domain error types
//!
//! These errors are framework-agnostic and represent business-level failures.

use std::collections::BTreeMap;
use std::fmt;

/// Field-keyed validation messages, as returned by the form validator
pub type FieldErrors = BTreeMap<String, String>;

/// Which cross-record uniqueness rule a genre write violated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniquenessConflict {
    /// Another genre already has this normalized name
    Name(String),
    /// Another genre already uses this color
    Color(String),
}

impl fmt::Display for UniquenessConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniquenessConflict::Name(name) => {
                write!(f, "A genre named \"{}\" already exists", name)
            }
            UniquenessConflict::Color(color) => {
                write!(f, "The color {} is already in use by another genre", color)
            }
        }
    }
}

#[derive(Debug)]
pub enum DomainError {
    /// Resource not found
    NotFound,
    /// Field-keyed validation errors
    Validation(FieldErrors),
    /// Name or color collision with another record
    Uniqueness(UniquenessConflict),
    /// Operation not allowed in the record's current state
    InvalidState(String),
    /// Database/persistence error
    Database(String),
    /// External service error
    External(String),
    /// Generic internal error
    Internal(String),
}

impl DomainError {
    /// Build a validation error for a single field
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), message.into());
        DomainError::Validation(errors)
    }

    /// Transient failures the user may retry (surfaced as a generic toast)
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::Database(_) | DomainError::External(_))
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainError::NotFound => write!(f, "Resource not found"),
            DomainError::Validation(errors) => {
                let joined = errors
                    .iter()
                    .map(|(field, msg)| format!("{}: {}", field, msg))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "Validation error: {}", joined)
            }
            DomainError::Uniqueness(conflict) => write!(f, "{}", conflict),
            DomainError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            DomainError::Database(msg) => write!(f, "Database error: {}", msg),
            DomainError::External(msg) => write!(f, "External service error: {}", msg),
            DomainError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for DomainError {}

// Conversion from SeaORM errors (used in infrastructure layer)
impl From<sea_orm::DbErr> for DomainError {
    fn from(e: sea_orm::DbErr) -> Self {
        DomainError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self {
        DomainError::Internal(format!("Malformed document: {}", e))
    }
}

//! Domain layer - Pure business abstractions
//!
//! This layer contains NO framework dependencies (no SeaORM, no HTTP).
//! Collaborator traits, domain error types and the reading-history rules.

pub mod errors;
pub mod reading;
pub mod repositories;

pub use errors::{DomainError, FieldErrors, UniquenessConflict};
pub use reading::ReadingStatus;
pub use repositories::*;

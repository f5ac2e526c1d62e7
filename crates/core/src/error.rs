//! Domain error model.

use thiserror::Error;

use crate::entity::EntityKind;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns are mapped into `Storage`
/// at the service boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input, bad date ordering).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(EntityKind),

    /// A proposed allocation would push a team member past the capacity cap.
    ///
    /// Carries both totals so callers can render the numbers without
    /// re-running the check.
    #[error("{warning}")]
    Overallocated {
        current_allocation: u32,
        proposed_allocation: u32,
        warning: String,
    },

    /// Stored version differs from the version the caller last read.
    ///
    /// Never auto-retried; the caller must re-fetch the record.
    #[error(
        "Version conflict: the record was modified by another user. Please refresh and try again."
    )]
    VersionConflict,

    /// Storage-layer failure surfaced as a generic error.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(kind: EntityKind) -> Self {
        Self::NotFound(kind)
    }

    pub fn overallocated(
        current_allocation: u32,
        proposed_allocation: u32,
        warning: impl Into<String>,
    ) -> Self {
        Self::Overallocated {
            current_allocation,
            proposed_allocation,
            warning: warning.into(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

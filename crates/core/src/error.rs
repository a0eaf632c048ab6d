//! Domain error model.

use thiserror::Error;

use crate::id::{ItemId, LocationId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts, stock shortages). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An argument failed validation (non-positive quantity, unknown policy, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated. Always a bug; aborts the operation.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested item, location, lot or record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Not enough stock to satisfy an allocation or issue.
    #[error(
        "insufficient inventory for item {item_id} at {location_id} (required: {required}, available: {available})"
    )]
    InsufficientInventory {
        item_id: ItemId,
        location_id: LocationId,
        required: i64,
        available: i64,
    },

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn insufficient(item_id: ItemId, location_id: LocationId, required: i64, available: i64) -> Self {
        Self::InsufficientInventory {
            item_id,
            location_id,
            required,
            available,
        }
    }
}

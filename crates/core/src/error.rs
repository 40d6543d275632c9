//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic business failures (validation,
/// invariants, inventory shortfalls). Infrastructure concerns belong
/// elsewhere. Transactional operations that return one of these roll back
/// completely; partial mutation is never observable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. non-positive quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Not enough uncommitted stock to satisfy the request.
    #[error("insufficient inventory: requested {requested}, available {available}")]
    InsufficientInventory { requested: i64, available: i64 },

    /// No stock row exists for the (item, warehouse) key.
    #[error("item not found in warehouse")]
    ItemNotFoundInWarehouse,

    /// The reservation id is unknown.
    #[error("reservation not found")]
    ReservationNotFound,

    /// The reservation exists but is no longer active.
    #[error("reservation not active (status: {status})")]
    ReservationNotActive { status: String },

    /// A batch with this number already exists.
    #[error("duplicate batch: {0}")]
    DuplicateBatch(String),

    /// The batch number is unknown.
    #[error("batch not found: {0}")]
    BatchNotFound(String),

    /// Merge sources span more than one item code.
    #[error("cannot merge batches of different items")]
    MixedItemMerge,

    /// Split quantities exceed the source batch's available quantity.
    #[error("over-allocation: requested {requested}, available {available}")]
    OverAllocation { requested: i64, available: i64 },

    /// Attempted to issue from a batch past its expiry date.
    #[error("batch has expired: {0}")]
    ExpiredBatchIssue(String),

    /// A conflict occurred (e.g. concurrent state change).
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

    pub fn insufficient(requested: i64, available: i64) -> Self {
        Self::InsufficientInventory {
            requested,
            available,
        }
    }

    pub fn over_allocation(requested: i64, available: i64) -> Self {
        Self::OverAllocation {
            requested,
            available,
        }
    }

    pub fn not_active(status: impl Into<String>) -> Self {
        Self::ReservationNotActive {
            status: status.into(),
        }
    }
}

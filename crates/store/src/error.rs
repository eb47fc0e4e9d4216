//! Store error types.

use domain::{DiscountError, DomainError, InventoryError};
use thiserror::Error;

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A compare-and-swap on a version stamp lost the race.
    ///
    /// Retryable: the caller should reload the aggregate and resubmit.
    #[error("Concurrent modification of {entity} {id}, reload and retry")]
    VersionConflict { entity: &'static str, id: String },

    /// A unique key already exists (idempotency key, gateway authority,
    /// second Succeeded transaction for an order).
    #[error("Duplicate {entity} key: {key}")]
    DuplicateKey { entity: &'static str, key: String },

    /// The referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A business rule was violated inside a locked store operation
    /// (insufficient stock, ineligible discount).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// True for conflicts the caller can resolve by reloading and retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }

    /// True for transient infrastructure failures worth retrying blindly at
    /// the transaction boundary (deadlock, serialization failure, lost
    /// connection).
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Io(_))
            | StoreError::Database(sqlx::Error::PoolTimedOut) => true,
            StoreError::Database(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => false,
        }
    }
}

impl From<InventoryError> for StoreError {
    fn from(e: InventoryError) -> Self {
        StoreError::Domain(DomainError::Inventory(e))
    }
}

impl From<DiscountError> for StoreError {
    fn from(e: DiscountError) -> Self {
        StoreError::Domain(DomainError::Discount(e))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

//! Reference-number correlation string.

use serde::{Deserialize, Serialize};

use crate::OrderId;

/// The string that groups inventory movements belonging to one logical
/// operation, conventionally `ORDER-{order uuid}`.
///
/// The ledger and the order aggregate stay decoupled: inventory operations
/// are committed or released as a unit by reference number without loading
/// the order, and every ledger write is idempotent per reference so the
/// string-based correlation is safe to retry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceNumber(String);

impl ReferenceNumber {
    /// Builds the reference for an order.
    pub fn for_order(order_id: OrderId) -> Self {
        Self(format!("ORDER-{order_id}"))
    }

    /// Wraps an already-formatted reference string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the reference as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReferenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ReferenceNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

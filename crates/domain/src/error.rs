//! Domain error roll-up.

use thiserror::Error;

use crate::discount::DiscountError;
use crate::inventory::InventoryError;
use crate::order::OrderError;
use crate::payment::PaymentError;

/// Any business-rule violation raised by an aggregate.
///
/// These are reported synchronously to the caller with a user-facing
/// message and are never retried automatically.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Order rule violation.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Payment rule violation.
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// Inventory rule violation.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Discount rule violation.
    #[error(transparent)]
    Discount(#[from] DiscountError),
}

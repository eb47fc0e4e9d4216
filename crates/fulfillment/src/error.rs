//! Fulfillment error types.

use common::{OrderId, PaymentId};
use domain::DomainError;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while driving the fulfillment flow.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Payment transaction not found.
    #[error("Payment not found: {0}")]
    PaymentNotFound(PaymentId),

    /// No transaction exists for the callback's authority.
    #[error("Unknown payment authority: {0}")]
    UnknownAuthority(String),

    /// The order is not in a state the operation accepts.
    #[error("Order not ready: {0}")]
    OrderNotReady(String),

    /// The order already has a successful payment.
    #[error("Order {0} is already paid")]
    AlreadyPaid(OrderId),

    /// Payment gateway error.
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    /// Notification delivery error. Callers treat this as best effort.
    #[error("Notification error: {0}")]
    Notification(String),

    /// Domain rule violation.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Persistence error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<domain::OrderError> for FulfillmentError {
    fn from(e: domain::OrderError) -> Self {
        FulfillmentError::Domain(DomainError::Order(e))
    }
}

impl From<domain::PaymentError> for FulfillmentError {
    fn from(e: domain::PaymentError) -> Self {
        FulfillmentError::Domain(DomainError::Payment(e))
    }
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;

//! Order aggregate and related types.

mod aggregate;
mod events;
mod state;

pub use aggregate::{AppliedDiscount, NewOrder, Order, OrderItem};
pub use events::OrderEvent;
pub use state::OrderStatus;

use common::{Money, VariantId};
use thiserror::Error;

/// Business-rule violations raised by the order aggregate.
#[derive(Debug, Error)]
pub enum OrderError {
    /// An order with zero items is invalid.
    #[error("Order must contain at least one item")]
    EmptyOrder,

    /// Item quantity must be greater than zero.
    #[error("Invalid quantity {quantity} for variant {variant_id}")]
    InvalidQuantity { variant_id: VariantId, quantity: u32 },

    /// Unit prices must not be negative.
    #[error("Invalid unit price {price} for variant {variant_id}")]
    InvalidPrice { variant_id: VariantId, price: Money },

    /// Checkout requires an idempotency key.
    #[error("Idempotency key is required")]
    MissingIdempotencyKey,

    /// The totals invariant `final = subtotal - discount + shipping >= 0`
    /// would be violated.
    #[error("Final amount {amount} must not be negative")]
    NegativeTotal { amount: Money },

    /// The requested transition is not legal from the current status.
    #[error("Cannot {action} an order in {status} status")]
    InvalidTransition {
        status: OrderStatus,
        action: &'static str,
    },

    /// Cancellation requires a non-empty reason.
    #[error("A cancellation reason is required")]
    ReasonRequired,

    /// The order can no longer be cancelled.
    #[error("Order in {status} status cannot be cancelled")]
    NotCancellable { status: OrderStatus },

    /// Returns are only accepted within the return window.
    #[error("Return window of {window_days} days has closed")]
    ReturnWindowClosed { window_days: i64 },
}

//! Order status machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Transitions:
/// ```text
/// Pending ──► Processing ──► Shipped ──► Delivered ──► Returned
///    │            │
///    └────────────┴──► Cancelled
/// ```
///
/// `Pending → Processing` happens only on payment success. Shipping and
/// delivery are strictly sequential. Cancellation is a status, never a row
/// removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Created at checkout, inventory reserved, payment not yet confirmed.
    #[default]
    Pending,

    /// Payment succeeded, inventory committed, being fulfilled.
    Processing,

    /// Handed to the carrier.
    Shipped,

    /// Received by the buyer.
    Delivered,

    /// Cancelled before shipment (terminal).
    Cancelled,

    /// Returned after delivery (terminal).
    Returned,
}

impl OrderStatus {
    /// Returns true while cancellation is still allowed: not yet shipped,
    /// not delivered, not already cancelled.
    pub fn can_be_cancelled(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// Returns true while items and fields may still change. Once paid or
    /// cancelled the order is read-only outside named transitions.
    pub fn can_be_modified(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true once a successful payment has been recorded.
    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            OrderStatus::Processing
                | OrderStatus::Shipped
                | OrderStatus::Delivered
                | OrderStatus::Returned
        )
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Returned)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Returned => "Returned",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(OrderStatus::Pending),
            "Processing" => Ok(OrderStatus::Processing),
            "Shipped" => Ok(OrderStatus::Shipped),
            "Delivered" => Ok(OrderStatus::Delivered),
            "Cancelled" => Ok(OrderStatus::Cancelled),
            "Returned" => Ok(OrderStatus::Returned),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

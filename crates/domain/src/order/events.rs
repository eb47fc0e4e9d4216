//! Order domain events.
//!
//! The aggregate records intent only. The fulfillment layer drains these
//! after the local write succeeds and drives notifications and
//! compensations; the aggregate itself never touches inventory, payment,
//! or discount state.

use common::OrderId;
use serde::{Deserialize, Serialize};

use super::OrderStatus;

/// An intent recorded by an order state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    /// The order moved between statuses.
    StatusChanged {
        order_id: OrderId,
        old: OrderStatus,
        new: OrderStatus,
    },

    /// The order was cancelled with a reason.
    Cancelled {
        order_id: OrderId,
        actor: String,
        reason: String,
    },

    /// The order was handed to the carrier.
    Shipped {
        order_id: OrderId,
        tracking_number: Option<String>,
    },

    /// The order was received by the buyer.
    Delivered { order_id: OrderId },

    /// The order was returned after delivery.
    Returned { order_id: OrderId, reason: String },
}

impl OrderEvent {
    /// Returns the event name.
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::StatusChanged { .. } => "StatusChanged",
            OrderEvent::Cancelled { .. } => "Cancelled",
            OrderEvent::Shipped { .. } => "Shipped",
            OrderEvent::Delivered { .. } => "Delivered",
            OrderEvent::Returned { .. } => "Returned",
        }
    }

    /// Returns the order this event belongs to.
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::StatusChanged { order_id, .. }
            | OrderEvent::Cancelled { order_id, .. }
            | OrderEvent::Shipped { order_id, .. }
            | OrderEvent::Delivered { order_id }
            | OrderEvent::Returned { order_id, .. } => *order_id,
        }
    }
}

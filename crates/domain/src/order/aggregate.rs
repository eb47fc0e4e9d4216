//! Order aggregate implementation.

use chrono::{DateTime, Duration, Utc};
use common::{
    BuyerId, DiscountCodeId, Money, OrderId, ReferenceNumber, ShippingMethodId, VariantId, Version,
};
use serde::{Deserialize, Serialize};

use super::{OrderError, OrderEvent, OrderStatus};

/// A line of an order.
///
/// Immutable once the order leaves Pending; the unit purchase price is kept
/// for profit reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The sellable variant being bought.
    pub variant_id: VariantId,

    /// Quantity ordered, always greater than zero.
    pub quantity: u32,

    /// Selling price per unit.
    pub unit_price: Money,

    /// Purchase price per unit.
    pub unit_cost: Money,
}

impl OrderItem {
    /// Creates a new order line.
    pub fn new(
        variant_id: VariantId,
        quantity: u32,
        unit_price: Money,
        unit_cost: Money,
    ) -> Self {
        Self {
            variant_id,
            quantity,
            unit_price,
            unit_cost,
        }
    }

    /// Returns `quantity * unit_price`.
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }

    /// Returns `quantity * (unit_price - unit_cost)`.
    pub fn line_profit(&self) -> Money {
        (self.unit_price - self.unit_cost).times(self.quantity)
    }
}

/// A discount already applied against a code's usage counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    /// The consumed code.
    pub code_id: DiscountCodeId,
    /// The computed discount amount.
    pub amount: Money,
}

/// Input for placing a new order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Identifier chosen by the caller so inventory can be reserved under
    /// the order's reference before the row exists.
    pub id: OrderId,
    pub buyer_id: BuyerId,
    pub items: Vec<OrderItem>,
    pub shipping_method_id: ShippingMethodId,
    pub shipping_cost: Money,
    pub discount: Option<AppliedDiscount>,
    /// Unique per buyer; replayed checkouts return the original order.
    pub idempotency_key: String,
}

/// The commercial record of a purchase.
///
/// Owns its items and totals and its own status machine. References
/// payment, inventory, and discount state by id or reference number only;
/// cross-aggregate effects are driven by the fulfillment layer from the
/// events this aggregate records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    buyer_id: BuyerId,
    items: Vec<OrderItem>,
    shipping_method_id: ShippingMethodId,
    discount_code_id: Option<DiscountCodeId>,
    status: OrderStatus,
    subtotal: Money,
    discount_amount: Money,
    shipping_cost: Money,
    final_amount: Money,
    idempotency_key: String,
    version: Version,
    created_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,

    #[serde(skip)]
    pending_events: Vec<OrderEvent>,
}

impl Order {
    /// Places a new order in Pending status.
    ///
    /// Validates the item list and enforces the totals invariant
    /// `final = subtotal - discount + shipping >= 0`.
    pub fn place(new: NewOrder, now: DateTime<Utc>) -> Result<Order, OrderError> {
        if new.idempotency_key.trim().is_empty() {
            return Err(OrderError::MissingIdempotencyKey);
        }

        if new.items.is_empty() {
            return Err(OrderError::EmptyOrder);
        }

        for item in &new.items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    variant_id: item.variant_id,
                    quantity: item.quantity,
                });
            }
            if item.unit_price.is_negative() {
                return Err(OrderError::InvalidPrice {
                    variant_id: item.variant_id,
                    price: item.unit_price,
                });
            }
        }

        let subtotal: Money = new.items.iter().map(OrderItem::line_total).sum();
        let discount_amount = new.discount.map(|d| d.amount).unwrap_or_default();
        let final_amount = subtotal - discount_amount + new.shipping_cost;

        if final_amount.is_negative() {
            return Err(OrderError::NegativeTotal {
                amount: final_amount,
            });
        }

        Ok(Order {
            id: new.id,
            buyer_id: new.buyer_id,
            items: new.items,
            shipping_method_id: new.shipping_method_id,
            discount_code_id: new.discount.map(|d| d.code_id),
            status: OrderStatus::Pending,
            subtotal,
            discount_amount,
            shipping_cost: new.shipping_cost,
            final_amount,
            idempotency_key: new.idempotency_key,
            version: Version::initial(),
            created_at: now,
            delivered_at: None,
            pending_events: Vec::new(),
        })
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn buyer_id(&self) -> BuyerId {
        self.buyer_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn shipping_method_id(&self) -> ShippingMethodId {
        self.shipping_method_id
    }

    pub fn discount_code_id(&self) -> Option<DiscountCodeId> {
        self.discount_code_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn discount_amount(&self) -> Money {
        self.discount_amount
    }

    pub fn shipping_cost(&self) -> Money {
        self.shipping_cost
    }

    pub fn final_amount(&self) -> Money {
        self.final_amount
    }

    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    /// The reference number grouping this order's inventory movements.
    pub fn reference(&self) -> ReferenceNumber {
        ReferenceNumber::for_order(self.id)
    }

    /// Total profit across all lines, for reporting.
    pub fn total_profit(&self) -> Money {
        self.items.iter().map(OrderItem::line_profit).sum()
    }

    /// True while cancellation is still allowed.
    pub fn can_be_cancelled(&self) -> bool {
        self.status.can_be_cancelled()
    }

    /// True while fields may still change.
    pub fn can_be_modified(&self) -> bool {
        self.status.can_be_modified()
    }

    /// Drains the events recorded by transitions since the last drain.
    pub fn take_events(&mut self) -> Vec<OrderEvent> {
        std::mem::take(&mut self.pending_events)
    }
}

// Named state transitions. Direct field assignment is never exposed.
impl Order {
    /// Pending → Processing, allowed only after payment success.
    pub fn mark_paid(&mut self) -> Result<(), OrderError> {
        if self.status != OrderStatus::Pending {
            return Err(OrderError::InvalidTransition {
                status: self.status,
                action: "mark paid",
            });
        }

        let old = self.status;
        self.status = OrderStatus::Processing;
        self.pending_events.push(OrderEvent::StatusChanged {
            order_id: self.id,
            old,
            new: self.status,
        });
        Ok(())
    }

    /// Pending/Processing → Cancelled, with a mandatory reason.
    pub fn cancel(&mut self, actor: &str, reason: &str) -> Result<(), OrderError> {
        if reason.trim().is_empty() {
            return Err(OrderError::ReasonRequired);
        }

        if !self.status.can_be_cancelled() {
            return Err(OrderError::NotCancellable {
                status: self.status,
            });
        }

        self.status = OrderStatus::Cancelled;
        self.pending_events.push(OrderEvent::Cancelled {
            order_id: self.id,
            actor: actor.to_string(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Processing → Shipped. Skipping ahead from Pending is rejected.
    pub fn ship(&mut self, tracking_number: Option<String>) -> Result<(), OrderError> {
        if self.status != OrderStatus::Processing {
            return Err(OrderError::InvalidTransition {
                status: self.status,
                action: "ship",
            });
        }

        self.status = OrderStatus::Shipped;
        self.pending_events.push(OrderEvent::Shipped {
            order_id: self.id,
            tracking_number,
        });
        Ok(())
    }

    /// Shipped → Delivered.
    pub fn deliver(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if self.status != OrderStatus::Shipped {
            return Err(OrderError::InvalidTransition {
                status: self.status,
                action: "deliver",
            });
        }

        self.status = OrderStatus::Delivered;
        self.delivered_at = Some(now);
        self.pending_events
            .push(OrderEvent::Delivered { order_id: self.id });
        Ok(())
    }

    /// Delivered → Returned, within the return window, with a reason.
    pub fn mark_returned(
        &mut self,
        reason: &str,
        now: DateTime<Utc>,
        window_days: i64,
    ) -> Result<(), OrderError> {
        if self.status != OrderStatus::Delivered {
            return Err(OrderError::InvalidTransition {
                status: self.status,
                action: "return",
            });
        }

        if reason.trim().is_empty() {
            return Err(OrderError::ReasonRequired);
        }

        let delivered_at = self.delivered_at.unwrap_or(self.created_at);
        if now - delivered_at > Duration::days(window_days) {
            return Err(OrderError::ReturnWindowClosed { window_days });
        }

        self.status = OrderStatus::Returned;
        self.pending_events.push(OrderEvent::Returned {
            order_id: self.id,
            reason: reason.to_string(),
        });
        Ok(())
    }
}

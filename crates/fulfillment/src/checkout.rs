//! Checkout: reserve, apply discount, place the order.

use chrono::Utc;
use common::{BuyerId, Money, OrderId, ReferenceNumber, ShippingMethodId};
use domain::order::{AppliedDiscount, NewOrder, OrderItem};
use domain::Order;
use store::StoreError;

use crate::error::{FulfillmentError, Result};
use crate::orchestrator::FulfillmentService;

/// One line of a checkout submission.
#[derive(Debug, Clone)]
pub struct CheckoutItem {
    pub variant_id: common::VariantId,
    pub quantity: u32,
    pub unit_price: Money,
    pub unit_cost: Money,
}

/// A checkout submission.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub buyer_id: BuyerId,
    pub items: Vec<CheckoutItem>,
    pub shipping_method_id: ShippingMethodId,
    pub shipping_cost: Money,
    pub discount_code: Option<String>,
    /// Unique per buyer. A replayed submission returns the original order.
    pub idempotency_key: String,
}

/// The orders place_order returns, distinguishing a replay.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: Order,
    /// True when the idempotency key matched an existing order.
    pub replayed: bool,
}

impl FulfillmentService {
    /// Places an order: reserve stock per item under the order's reference,
    /// apply the discount code if present, persist the Pending order.
    ///
    /// Any failure after a reservation releases everything reserved so far;
    /// a failed checkout leaves no counters moved and no usage consumed.
    #[tracing::instrument(skip(self, request), fields(buyer_id = %request.buyer_id))]
    pub async fn place_order(&self, request: CheckoutRequest) -> Result<PlacedOrder> {
        metrics::counter!("checkouts_total").increment(1);

        if let Some(existing) = self
            .orders
            .find_by_idempotency_key(request.buyer_id, &request.idempotency_key)
            .await?
        {
            tracing::info!(order_id = %existing.id(), "idempotency key replay");
            metrics::counter!("checkout_replays_total").increment(1);
            return Ok(PlacedOrder {
                order: existing,
                replayed: true,
            });
        }

        // The order id is chosen up front so stock can be reserved under
        // the order's reference before the row exists.
        let order_id = OrderId::new();
        let reference = ReferenceNumber::for_order(order_id);
        let expires_at = Utc::now() + self.config.reservation_ttl;

        for item in &request.items {
            let reserved = self
                .inventory
                .reserve(
                    item.variant_id,
                    i64::from(item.quantity),
                    &reference,
                    Some(expires_at),
                )
                .await;
            if let Err(err) = reserved {
                self.release_partial(&reference).await;
                return Err(err.into());
            }
        }

        let items: Vec<OrderItem> = request
            .items
            .iter()
            .map(|i| OrderItem::new(i.variant_id, i.quantity, i.unit_price, i.unit_cost))
            .collect();
        let subtotal: Money = items.iter().map(OrderItem::line_total).sum();

        let discount = match &request.discount_code {
            Some(code) => {
                let applied = self
                    .discounts
                    .apply(code, request.buyer_id, order_id, subtotal, Utc::now())
                    .await;
                match applied {
                    Ok(usage) => Some(AppliedDiscount {
                        code_id: usage.code_id,
                        amount: usage.amount,
                    }),
                    Err(StoreError::NotFound { .. }) => {
                        self.release_partial(&reference).await;
                        return Err(FulfillmentError::OrderNotReady(format!(
                            "unknown discount code: {code}"
                        )));
                    }
                    Err(err) => {
                        self.release_partial(&reference).await;
                        return Err(err.into());
                    }
                }
            }
            None => None,
        };

        let new_order = NewOrder {
            id: order_id,
            buyer_id: request.buyer_id,
            items,
            shipping_method_id: request.shipping_method_id,
            shipping_cost: request.shipping_cost,
            discount,
            idempotency_key: request.idempotency_key.clone(),
        };

        let order = match Order::place(new_order, Utc::now()) {
            Ok(order) => order,
            Err(err) => {
                self.unwind_checkout(order_id, &reference).await;
                return Err(err.into());
            }
        };

        match self.orders.insert(&order).await {
            Ok(()) => {}
            Err(StoreError::DuplicateKey { .. }) => {
                // Lost a race against a concurrent identical submission.
                self.unwind_checkout(order_id, &reference).await;
                let existing = self
                    .orders
                    .find_by_idempotency_key(request.buyer_id, &request.idempotency_key)
                    .await?
                    .ok_or(FulfillmentError::OrderNotFound(order_id))?;
                return Ok(PlacedOrder {
                    order: existing,
                    replayed: true,
                });
            }
            Err(err) => {
                self.unwind_checkout(order_id, &reference).await;
                return Err(err.into());
            }
        }

        tracing::info!(%order_id, amount = %order.final_amount(), "order placed");
        metrics::counter!("orders_placed_total").increment(1);
        if let Err(err) = self
            .audit
            .record("order", "checkout", format!("placed {order_id}"))
            .await
        {
            tracing::warn!(error = %err, "audit write failed");
        }

        Ok(PlacedOrder {
            order,
            replayed: false,
        })
    }

    /// Releases any reservations held under a failed checkout's reference.
    async fn release_partial(&self, reference: &ReferenceNumber) {
        if let Err(err) = self.inventory.release(reference).await {
            tracing::error!(%reference, error = %err, "failed to release partial reservations");
        }
    }

    /// Undoes both the reservations and any consumed discount usage.
    async fn unwind_checkout(&self, order_id: OrderId, reference: &ReferenceNumber) {
        self.release_partial(reference).await;
        if let Err(err) = self.discounts.cancel_usage(order_id).await {
            tracing::error!(%order_id, error = %err, "failed to cancel discount usage");
        }
    }
}

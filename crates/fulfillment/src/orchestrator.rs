//! The fulfillment orchestrator.
//!
//! Drives cross-aggregate effects as direct calls after each local write
//! commits: payment success commits inventory and confirms the discount,
//! cancellation releases reservations and cancels the usage. Compensations
//! are idempotent so a retried or double-invoked step is safe.

use std::sync::Arc;

use chrono::Utc;
use common::OrderId;
use domain::{DomainError, Order, OrderStatus};
use store::{DiscountStore, InventoryStore, OrderStore, PaymentStore, StoreError, with_retry};

use crate::config::FulfillmentConfig;
use crate::error::{FulfillmentError, Result};
use crate::services::{AuditSink, NotificationSender, PaymentGateway};

/// Orchestrates checkout, payment, and lifecycle transitions across the
/// four aggregates.
pub struct FulfillmentService {
    pub(crate) orders: Arc<dyn OrderStore>,
    pub(crate) payments: Arc<dyn PaymentStore>,
    pub(crate) inventory: Arc<dyn InventoryStore>,
    pub(crate) discounts: Arc<dyn DiscountStore>,
    pub(crate) gateway: Arc<dyn PaymentGateway>,
    pub(crate) notifications: Arc<dyn NotificationSender>,
    pub(crate) audit: Arc<dyn AuditSink>,
    pub(crate) config: FulfillmentConfig,
}

impl FulfillmentService {
    /// Creates a new fulfillment service.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        payments: Arc<dyn PaymentStore>,
        inventory: Arc<dyn InventoryStore>,
        discounts: Arc<dyn DiscountStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifications: Arc<dyn NotificationSender>,
        audit: Arc<dyn AuditSink>,
        config: FulfillmentConfig,
    ) -> Self {
        Self {
            orders,
            payments,
            inventory,
            discounts,
            gateway,
            notifications,
            audit,
            config,
        }
    }

    pub fn config(&self) -> &FulfillmentConfig {
        &self.config
    }

    /// Loads an order or fails with `OrderNotFound`.
    pub async fn load_order(&self, order_id: OrderId) -> Result<Order> {
        self.orders
            .find(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))
    }

    /// Applies a state transition to an order with a compare-and-swap write,
    /// reloading and retrying on version conflicts.
    pub(crate) async fn update_order_with<F>(
        &self,
        order_id: OrderId,
        name: &'static str,
        mutate: F,
    ) -> Result<Order>
    where
        F: Fn(&mut Order) -> std::result::Result<(), DomainError> + Send + Sync,
    {
        let orders = &self.orders;
        let result = with_retry(name, self.config.max_retries, || async {
            let mut order =
                orders
                    .find(order_id)
                    .await?
                    .ok_or_else(|| StoreError::NotFound {
                        entity: "order",
                        id: order_id.to_string(),
                    })?;
            mutate(&mut order)?;
            let version = orders.update(&order).await?;
            order.set_version(version);
            Ok(order)
        })
        .await;

        match result {
            Ok(order) => Ok(order),
            Err(StoreError::NotFound { entity: "order", .. }) => {
                Err(FulfillmentError::OrderNotFound(order_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Runs the effects of a successful payment.
    ///
    /// Inventory commit failure is logged for reconciliation and does not
    /// fail the payment; the charge already happened and the reservation
    /// keeps the stock from being oversold in the meantime.
    #[tracing::instrument(skip(self))]
    pub async fn on_payment_succeeded(&self, order_id: OrderId) -> Result<Order> {
        let order = self.load_order(order_id).await?;
        let reference = order.reference();

        match self.inventory.commit(&reference).await {
            Ok(committed) => {
                tracing::info!(%order_id, committed, "inventory committed");
            }
            Err(err) => {
                tracing::error!(%order_id, error = %err, "inventory commit failed, reconciliation required");
                metrics::counter!("inventory_commit_failures_total").increment(1);
            }
        }

        if order.discount_code_id().is_some() {
            self.discounts.confirm_usage(order_id).await?;
        }

        let mut order = self
            .update_order_with(order_id, "mark_paid", |o| {
                o.mark_paid().map_err(DomainError::from)
            })
            .await?;
        self.record_events(&mut order).await;

        self.notify_status(&order).await;
        metrics::counter!("orders_paid_total").increment(1);
        Ok(order)
    }

    /// Cancels an order, releasing its reservations and discount usage.
    ///
    /// The status write runs first, so a racing payment callback either
    /// loses the order row and fails its own transition, or wins it and
    /// this cancel is refused before any compensation fires. No partially
    /// cancelled order is ever observable. The compensations that follow
    /// are idempotent per reference, and releasing a reservation that was
    /// already sold is a no-op rather than negative stock; a compensation
    /// failure after the write is logged and closed out by the sweep.
    #[tracing::instrument(skip(self, reason))]
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        actor: &str,
        reason: &str,
    ) -> Result<Order> {
        let mut order = self
            .update_order_with(order_id, "cancel_order", |o| {
                o.cancel(actor, reason).map_err(DomainError::from)
            })
            .await?;

        let released = match self.inventory.release(&order.reference()).await {
            Ok(count) => count,
            Err(err) => {
                tracing::error!(%order_id, error = %err, "release after cancel failed");
                metrics::counter!("cancel_compensation_failures_total").increment(1);
                0
            }
        };
        if let Err(err) = self.discounts.cancel_usage(order_id).await {
            tracing::error!(%order_id, error = %err, "usage cancel after cancel failed");
            metrics::counter!("cancel_compensation_failures_total").increment(1);
        }

        self.record_events(&mut order).await;

        tracing::info!(%order_id, actor, released, "order cancelled");
        metrics::counter!("orders_cancelled_total").increment(1);
        self.notify_status(&order).await;
        Ok(order)
    }

    /// Marks a paid order shipped.
    pub async fn ship_order(
        &self,
        order_id: OrderId,
        tracking_number: Option<String>,
    ) -> Result<Order> {
        let mut order = self
            .update_order_with(order_id, "ship_order", |o| {
                o.ship(tracking_number.clone()).map_err(DomainError::from)
            })
            .await?;
        self.record_events(&mut order).await;
        self.notify_status(&order).await;
        Ok(order)
    }

    /// Marks a shipped order delivered, starting the return window.
    pub async fn deliver_order(&self, order_id: OrderId) -> Result<Order> {
        let mut order = self
            .update_order_with(order_id, "deliver_order", |o| {
                o.deliver(Utc::now()).map_err(DomainError::from)
            })
            .await?;
        self.record_events(&mut order).await;
        self.notify_status(&order).await;
        Ok(order)
    }

    /// Returns a delivered order, restoring its stock.
    ///
    /// Refunding the payment is a separate admin step; see
    /// [`refund`](FulfillmentService::refund).
    #[tracing::instrument(skip(self, reason))]
    pub async fn return_order(&self, order_id: OrderId, reason: &str) -> Result<Order> {
        let window = self.config.return_window_days;
        let mut order = self
            .update_order_with(order_id, "return_order", |o| {
                o.mark_returned(reason, Utc::now(), window)
                    .map_err(DomainError::from)
            })
            .await?;
        self.record_events(&mut order).await;

        let reference = order.reference();
        for item in order.items() {
            self.inventory
                .restock_return(item.variant_id, i64::from(item.quantity), &reference)
                .await?;
        }

        metrics::counter!("orders_returned_total").increment(1);
        self.notify_status(&order).await;
        Ok(order)
    }

    /// Sends a status notification, logging failures instead of surfacing
    /// them.
    pub(crate) async fn notify_status(&self, order: &Order) {
        if let Err(err) = self
            .notifications
            .order_status(order.id(), order.status())
            .await
        {
            tracing::warn!(order_id = %order.id(), error = %err, "notification failed");
        }
    }

    /// Drains an order's recorded events into the audit sink.
    pub(crate) async fn record_events(&self, order: &mut Order) {
        for event in order.take_events() {
            let details = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(_) => event.event_type().to_string(),
            };
            if let Err(err) = self.audit.record("order", "fulfillment", details).await {
                tracing::warn!(error = %err, "audit write failed");
            }
        }
    }
}

// Free helper used by handlers that only know the order's status.
pub(crate) fn ensure_pending(order: &Order) -> Result<()> {
    if order.status() != OrderStatus::Pending {
        return Err(FulfillmentError::OrderNotReady(format!(
            "order is {}, expected Pending",
            order.status()
        )));
    }
    Ok(())
}

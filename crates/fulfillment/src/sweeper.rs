//! Background expiry sweepers.
//!
//! Two independent safety nets: pending payments past the cutoff are
//! expired (and their unpaid orders cancelled), and lapsed reservations
//! are released. Both operate on idempotent store operations, so a sweep
//! that overlaps a live request or a second sweeper run changes nothing.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use domain::OrderStatus;

use crate::error::Result;
use crate::orchestrator::FulfillmentService;

const SWEEP_BATCH: i64 = 100;

/// Periodic sweeper over stale payments and expired reservations.
pub struct ExpirySweeper {
    service: Arc<FulfillmentService>,
    interval: Duration,
}

impl ExpirySweeper {
    /// Creates a sweeper over the given service.
    pub fn new(service: Arc<FulfillmentService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Runs both sweeps forever on a fixed interval. The caller owns the
    /// task and aborts it on shutdown.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            if let Err(err) = self.sweep_stale_payments().await {
                tracing::error!(error = %err, "payment sweep failed");
            }
            if let Err(err) = self.sweep_expired_reservations().await {
                tracing::error!(error = %err, "reservation sweep failed");
            }
        }
    }

    /// Expires Pending payments older than the cutoff and cancels their
    /// orders when still unpaid. Per-row errors are logged and skipped so
    /// one bad row never wedges the sweep.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_stale_payments(&self) -> Result<u64> {
        let service = &self.service;
        let cutoff = Utc::now() - service.config.payment_pending_cutoff;
        let stale = service.payments.find_stale_pending(cutoff, SWEEP_BATCH).await?;

        let mut expired = 0;
        for mut transaction in stale {
            if !transaction.expire(cutoff) {
                continue;
            }
            if let Err(err) = service.payments.update(&transaction).await {
                tracing::warn!(
                    payment_id = %transaction.id(),
                    error = %err,
                    "failed to expire payment"
                );
                continue;
            }
            expired += 1;

            match service.orders.find(transaction.order_id()).await {
                Ok(Some(order)) if order.status() == OrderStatus::Pending => {
                    if let Err(err) = service
                        .cancel_order(order.id(), "sweeper", "payment window elapsed")
                        .await
                    {
                        tracing::warn!(order_id = %order.id(), error = %err, "sweep cancel failed");
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(
                        order_id = %transaction.order_id(),
                        error = %err,
                        "failed to load order during sweep"
                    );
                }
            }
        }

        if expired > 0 {
            tracing::info!(expired, "expired stale payments");
            metrics::counter!("payments_expired_total").increment(expired);
        }
        Ok(expired)
    }

    /// Releases reservations whose expiry has passed, grouped by reference.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_expired_reservations(&self) -> Result<u64> {
        let inventory = &self.service.inventory;
        let references = inventory.expired_references(Utc::now()).await?;

        let mut released = 0;
        for reference in references {
            match inventory.release(&reference).await {
                Ok(count) => released += count,
                Err(err) => {
                    tracing::warn!(%reference, error = %err, "failed to release reservations");
                }
            }
        }

        if released > 0 {
            tracing::info!(released, "released expired reservations");
            metrics::counter!("reservations_swept_total").increment(released);
        }
        Ok(released)
    }
}

//! Payment flow: initiate, verify callback, refund.

use chrono::Utc;
use common::{Money, OrderId, PaymentId};
use domain::{PaymentStatus, PaymentTransaction};

use crate::error::{FulfillmentError, Result};
use crate::orchestrator::{FulfillmentService, ensure_pending};

impl FulfillmentService {
    /// Initiates a gateway charge for a Pending order.
    ///
    /// The gateway call runs outside any database transaction. A failed or
    /// expired earlier attempt never blocks a new one; only an existing
    /// Succeeded transaction does.
    #[tracing::instrument(skip(self))]
    pub async fn initiate_payment(&self, order_id: OrderId) -> Result<PaymentTransaction> {
        let order = self.load_order(order_id).await?;
        ensure_pending(&order)?;

        if self.payments.has_succeeded_for_order(order_id).await? {
            return Err(FulfillmentError::AlreadyPaid(order_id));
        }

        let authority = self
            .gateway
            .initiate(order.final_amount(), &self.config.callback_url)
            .await?;

        let transaction =
            PaymentTransaction::initiate(order_id, order.final_amount(), authority, Utc::now());
        self.payments.insert(&transaction).await?;

        tracing::info!(%order_id, authority = transaction.authority(), "payment initiated");
        metrics::counter!("payments_initiated_total").increment(1);
        Ok(transaction)
    }

    /// Handles the gateway callback for an authority.
    ///
    /// Terminal transactions are an idempotent replay: the stored row is
    /// returned untouched and no effect runs twice. Verification re-asks
    /// the gateway rather than trusting the callback body; a declined
    /// charge or an amount mismatch marks the transaction Failed.
    #[tracing::instrument(skip(self))]
    pub async fn handle_callback(&self, authority: &str) -> Result<PaymentTransaction> {
        let Some(mut transaction) = self.payments.find_by_authority(authority).await? else {
            return Err(FulfillmentError::UnknownAuthority(authority.to_string()));
        };

        if transaction.status().is_terminal() {
            tracing::info!(authority, status = %transaction.status(), "callback replay ignored");
            metrics::counter!("payment_callback_replays_total").increment(1);
            return Ok(transaction);
        }

        let verification = self.gateway.verify(authority, transaction.amount()).await?;
        let outcome = transaction.verify(
            verification.ok,
            verification.amount,
            verification.ref_id,
            verification.card_mask,
            Utc::now(),
        )?;
        self.payments.update(&transaction).await?;

        match outcome {
            PaymentStatus::Succeeded => {
                tracing::info!(authority, "payment verified");
                metrics::counter!("payments_succeeded_total").increment(1);
                self.on_payment_succeeded(transaction.order_id()).await?;
            }
            _ => {
                tracing::warn!(authority, status = %outcome, "payment verification failed");
                metrics::counter!("payments_failed_total").increment(1);
            }
        }

        self.notify_payment(&transaction).await;
        Ok(transaction)
    }

    /// Refunds a succeeded transaction, fully or partially.
    ///
    /// Admin path. Cancels the order's pending discount usage; restoring
    /// stock belongs to the return flow so a return plus a refund never
    /// restocks twice.
    #[tracing::instrument(skip(self, reason))]
    pub async fn refund(
        &self,
        payment_id: PaymentId,
        amount: Option<Money>,
        actor: &str,
        reason: &str,
    ) -> Result<PaymentTransaction> {
        let mut transaction = self
            .payments
            .find(payment_id)
            .await?
            .ok_or(FulfillmentError::PaymentNotFound(payment_id))?;

        let refunded = transaction.refund(amount)?;
        self.payments.update(&transaction).await?;
        self.discounts.cancel_usage(transaction.order_id()).await?;

        tracing::info!(%payment_id, refunded = %refunded, actor, "payment refunded");
        metrics::counter!("payments_refunded_total").increment(1);
        if let Err(err) = self
            .audit
            .record(
                "payment",
                actor,
                format!("refunded {refunded} of {payment_id}: {reason}"),
            )
            .await
        {
            tracing::warn!(error = %err, "audit write failed");
        }

        self.notify_payment(&transaction).await;
        Ok(transaction)
    }

    async fn notify_payment(&self, transaction: &PaymentTransaction) {
        if let Err(err) = self
            .notifications
            .payment_result(transaction.order_id(), transaction.status())
            .await
        {
            tracing::warn!(order_id = %transaction.order_id(), error = %err, "notification failed");
        }
    }
}

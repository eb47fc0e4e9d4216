//! Payment transaction aggregate.
//!
//! One record per attempted gateway charge. A failed or expired transaction
//! never blocks creating a new one for the same order; the "at most one
//! Succeeded per order" rule is enforced by the payment flow (and a partial
//! unique index in Postgres) before verification.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The status of a payment transaction.
///
/// `Pending → Succeeded | Failed | Expired | Cancelled`, plus the admin-only
/// `Succeeded → Refunded`. Every status except Pending is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    /// Charge initiated, awaiting the gateway callback.
    #[default]
    Pending,

    /// Gateway verified the charge.
    Succeeded,

    /// Gateway declined, or verification did not match.
    Failed,

    /// Swept after sitting Pending past the cutoff.
    Expired,

    /// Cancelled before verification.
    Cancelled,

    /// Refunded after success (admin only).
    Refunded,
}

impl PaymentStatus {
    /// Returns true once no further transition is possible except
    /// `Succeeded → Refunded`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Succeeded => "Succeeded",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Expired => "Expired",
            PaymentStatus::Cancelled => "Cancelled",
            PaymentStatus::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(PaymentStatus::Pending),
            "Succeeded" => Ok(PaymentStatus::Succeeded),
            "Failed" => Ok(PaymentStatus::Failed),
            "Expired" => Ok(PaymentStatus::Expired),
            "Cancelled" => Ok(PaymentStatus::Cancelled),
            "Refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// Business-rule violations raised by the payment aggregate.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The transaction has already reached a terminal status.
    #[error("Payment is already {status}, no further transition allowed")]
    AlreadyTerminal { status: PaymentStatus },

    /// Refunds require a Succeeded transaction.
    #[error("Cannot refund a payment in {status} status")]
    NotRefundable { status: PaymentStatus },

    /// Partial refunds must not exceed the captured amount.
    #[error("Refund amount {requested} exceeds captured amount {captured}")]
    RefundExceedsAmount { requested: Money, captured: Money },

    /// Refund amounts must be positive.
    #[error("Refund amount {amount} must be positive")]
    InvalidRefundAmount { amount: Money },
}

/// One attempted gateway charge and its verification outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    id: PaymentId,
    order_id: OrderId,
    /// Gateway authority string, unique across all transactions.
    authority: String,
    amount: Money,
    status: PaymentStatus,
    external_ref: Option<String>,
    card_mask: Option<String>,
    refunded_amount: Option<Money>,
    created_at: DateTime<Utc>,
    verified_at: Option<DateTime<Utc>>,
}

impl PaymentTransaction {
    /// Creates a Pending transaction for an initiated charge.
    pub fn initiate(
        order_id: OrderId,
        amount: Money,
        authority: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            order_id,
            authority: authority.into(),
            amount,
            status: PaymentStatus::Pending,
            external_ref: None,
            card_mask: None,
            refunded_amount: None,
            created_at: now,
            verified_at: None,
        }
    }

    pub fn id(&self) -> PaymentId {
        self.id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn external_ref(&self) -> Option<&str> {
        self.external_ref.as_deref()
    }

    pub fn card_mask(&self) -> Option<&str> {
        self.card_mask.as_deref()
    }

    pub fn refunded_amount(&self) -> Option<Money> {
        self.refunded_amount
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn verified_at(&self) -> Option<DateTime<Utc>> {
        self.verified_at
    }

    /// Records the gateway verification outcome.
    ///
    /// An amount mismatch is a Failed transition, not a retryable error.
    /// Verifying an already-terminal transaction is rejected; the flow layer
    /// treats that case as an idempotent replay instead of calling here.
    pub fn verify(
        &mut self,
        gateway_ok: bool,
        reported_amount: Money,
        external_ref: Option<String>,
        card_mask: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<PaymentStatus, PaymentError> {
        if self.status != PaymentStatus::Pending {
            return Err(PaymentError::AlreadyTerminal {
                status: self.status,
            });
        }

        self.verified_at = Some(now);

        if !gateway_ok || reported_amount != self.amount {
            self.status = PaymentStatus::Failed;
            return Ok(PaymentStatus::Failed);
        }

        self.status = PaymentStatus::Succeeded;
        self.external_ref = external_ref;
        self.card_mask = card_mask;
        Ok(PaymentStatus::Succeeded)
    }

    /// Expires a Pending transaction older than the cutoff.
    ///
    /// Idempotent: returns false without error when the transaction is
    /// already terminal or not yet stale.
    pub fn expire(&mut self, cutoff: DateTime<Utc>) -> bool {
        if self.status != PaymentStatus::Pending || self.created_at >= cutoff {
            return false;
        }
        self.status = PaymentStatus::Expired;
        true
    }

    /// Cancels a Pending transaction.
    pub fn cancel(&mut self) -> Result<(), PaymentError> {
        if self.status != PaymentStatus::Pending {
            return Err(PaymentError::AlreadyTerminal {
                status: self.status,
            });
        }
        self.status = PaymentStatus::Cancelled;
        Ok(())
    }

    /// Refunds a Succeeded transaction, fully or partially.
    ///
    /// Returns the refunded amount. Refunding does not reopen the order;
    /// compensations are driven by the handler that called this.
    pub fn refund(&mut self, amount: Option<Money>) -> Result<Money, PaymentError> {
        match self.status {
            PaymentStatus::Succeeded => {}
            PaymentStatus::Refunded => {
                return Err(PaymentError::NotRefundable {
                    status: self.status,
                });
            }
            status => return Err(PaymentError::NotRefundable { status }),
        }

        let amount = amount.unwrap_or(self.amount);
        if !amount.is_positive() {
            return Err(PaymentError::InvalidRefundAmount { amount });
        }
        if amount > self.amount {
            return Err(PaymentError::RefundExceedsAmount {
                requested: amount,
                captured: self.amount,
            });
        }

        self.status = PaymentStatus::Refunded;
        self.refunded_amount = Some(amount);
        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending() -> PaymentTransaction {
        PaymentTransaction::initiate(
            OrderId::new(),
            Money::from_cents(2500),
            "AUTH-1",
            Utc::now(),
        )
    }

    #[test]
    fn verify_success() {
        let mut tx = pending();
        let status = tx
            .verify(
                true,
                Money::from_cents(2500),
                Some("REF-9".to_string()),
                Some("****1234".to_string()),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(status, PaymentStatus::Succeeded);
        assert_eq!(tx.external_ref(), Some("REF-9"));
        assert!(tx.verified_at().is_some());
    }

    #[test]
    fn verify_amount_mismatch_fails_transaction() {
        let mut tx = pending();
        let status = tx
            .verify(true, Money::from_cents(100), None, None, Utc::now())
            .unwrap();
        assert_eq!(status, PaymentStatus::Failed);
        assert!(tx.status().is_terminal());
    }

    #[test]
    fn verify_gateway_decline_fails_transaction() {
        let mut tx = pending();
        let status = tx
            .verify(false, Money::from_cents(2500), None, None, Utc::now())
            .unwrap();
        assert_eq!(status, PaymentStatus::Failed);
    }

    #[test]
    fn verify_terminal_is_rejected() {
        let mut tx = pending();
        tx.verify(true, Money::from_cents(2500), None, None, Utc::now())
            .unwrap();
        let result = tx.verify(true, Money::from_cents(2500), None, None, Utc::now());
        assert!(matches!(result, Err(PaymentError::AlreadyTerminal { .. })));
    }

    #[test]
    fn expire_stale_pending() {
        let mut tx = pending();
        let cutoff = Utc::now() + Duration::minutes(30);
        assert!(tx.expire(cutoff));
        assert_eq!(tx.status(), PaymentStatus::Expired);
    }

    #[test]
    fn expire_is_idempotent() {
        let mut tx = pending();
        let cutoff = Utc::now() + Duration::minutes(30);
        assert!(tx.expire(cutoff));
        assert!(!tx.expire(cutoff));
        assert_eq!(tx.status(), PaymentStatus::Expired);
    }

    #[test]
    fn expire_fresh_pending_is_noop() {
        let mut tx = pending();
        let cutoff = Utc::now() - Duration::minutes(30);
        assert!(!tx.expire(cutoff));
        assert_eq!(tx.status(), PaymentStatus::Pending);
    }

    #[test]
    fn refund_full() {
        let mut tx = pending();
        tx.verify(true, Money::from_cents(2500), None, None, Utc::now())
            .unwrap();
        let refunded = tx.refund(None).unwrap();
        assert_eq!(refunded.cents(), 2500);
        assert_eq!(tx.status(), PaymentStatus::Refunded);
    }

    #[test]
    fn refund_partial() {
        let mut tx = pending();
        tx.verify(true, Money::from_cents(2500), None, None, Utc::now())
            .unwrap();
        let refunded = tx.refund(Some(Money::from_cents(1000))).unwrap();
        assert_eq!(refunded.cents(), 1000);
        assert_eq!(tx.refunded_amount(), Some(Money::from_cents(1000)));
    }

    #[test]
    fn refund_pending_is_rejected() {
        let mut tx = pending();
        assert!(matches!(
            tx.refund(None),
            Err(PaymentError::NotRefundable { .. })
        ));
    }

    #[test]
    fn refund_twice_is_rejected() {
        let mut tx = pending();
        tx.verify(true, Money::from_cents(2500), None, None, Utc::now())
            .unwrap();
        tx.refund(None).unwrap();
        assert!(matches!(
            tx.refund(None),
            Err(PaymentError::NotRefundable { .. })
        ));
    }

    #[test]
    fn refund_exceeding_capture_is_rejected() {
        let mut tx = pending();
        tx.verify(true, Money::from_cents(2500), None, None, Utc::now())
            .unwrap();
        let result = tx.refund(Some(Money::from_cents(9999)));
        assert!(matches!(
            result,
            Err(PaymentError::RefundExceedsAmount { .. })
        ));
    }

    #[test]
    fn cancel_pending() {
        let mut tx = pending();
        tx.cancel().unwrap();
        assert_eq!(tx.status(), PaymentStatus::Cancelled);
        assert!(tx.cancel().is_err());
    }
}

//! Payment transaction repository contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId};
use domain::PaymentTransaction;

use crate::Result;

/// Persistence for payment transactions.
///
/// Each transaction is its own persistence root: a failed or expired row
/// never blocks inserting a new attempt for the same order. The gateway
/// authority string is unique, and at most one transaction per order may be
/// Succeeded.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts a newly initiated transaction.
    ///
    /// Fails with `DuplicateKey` when the authority already exists.
    async fn insert(&self, transaction: &PaymentTransaction) -> Result<()>;

    /// Loads a transaction by id.
    async fn find(&self, id: PaymentId) -> Result<Option<PaymentTransaction>>;

    /// Loads a transaction by its gateway authority.
    async fn find_by_authority(&self, authority: &str) -> Result<Option<PaymentTransaction>>;

    /// Returns true if the order already has a Succeeded transaction.
    async fn has_succeeded_for_order(&self, order_id: OrderId) -> Result<bool>;

    /// Persists a status transition.
    ///
    /// Fails with `DuplicateKey` when this write would record a second
    /// Succeeded transaction for the same order.
    async fn update(&self, transaction: &PaymentTransaction) -> Result<()>;

    /// Pending transactions created before `cutoff`, oldest first, for the
    /// expiry sweeper.
    async fn find_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PaymentTransaction>>;
}

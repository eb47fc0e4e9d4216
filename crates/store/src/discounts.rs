//! Discount code repository contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BuyerId, Money, OrderId};
use domain::{DiscountCode, DiscountUsage};

use crate::Result;

/// Persistence for discount codes and their usage rows.
///
/// The code row is the contended resource, so application is pessimistic:
/// [`apply`](DiscountStore::apply) takes a row-exclusive lock on the code
/// for the validate-and-increment sequence only. The lock never spans an
/// external call.
#[async_trait]
pub trait DiscountStore: Send + Sync {
    /// Inserts a new code. Fails with `DuplicateKey` on a code collision.
    async fn insert_code(&self, code: &DiscountCode) -> Result<()>;

    /// Loads a code by its (case-insensitive) code string.
    async fn find_code(&self, code: &str) -> Result<Option<DiscountCode>>;

    /// Applies the code to an order under a row lock.
    ///
    /// Inside the lock: re-validate (activity window, minimum total, global
    /// and per-user limits), compute the amount, increment `used_count`,
    /// insert a pending usage row, commit. Validation failures surface as
    /// `StoreError::Domain`.
    async fn apply(
        &self,
        code: &str,
        buyer_id: BuyerId,
        order_id: OrderId,
        order_total: Money,
        now: DateTime<Utc>,
    ) -> Result<DiscountUsage>;

    /// Marks the order's usage confirmed. Returns false when there is no
    /// pending usage for the order (already confirmed/cancelled, or none).
    async fn confirm_usage(&self, order_id: OrderId) -> Result<bool>;

    /// Marks the order's usage cancelled. Never decrements `used_count`.
    /// Returns false when there is no pending usage for the order.
    async fn cancel_usage(&self, order_id: OrderId) -> Result<bool>;

    /// Loads the usage row an order consumed, if any.
    async fn usage_for_order(&self, order_id: OrderId) -> Result<Option<DiscountUsage>>;
}

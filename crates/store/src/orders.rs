//! Order repository contract.

use async_trait::async_trait;
use common::{BuyerId, OrderId, Version};
use domain::Order;

use crate::Result;

/// Persistence for the order aggregate.
///
/// Orders use optimistic concurrency: [`update`](OrderStore::update)
/// compares the stored version stamp against the one the caller loaded and
/// fails with a retryable conflict when stale. Orders are never deleted;
/// cancellation is a status.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a freshly placed order.
    ///
    /// Fails with `DuplicateKey` when the buyer already has an order with
    /// the same idempotency key.
    async fn insert(&self, order: &Order) -> Result<()>;

    /// Loads an order by id.
    async fn find(&self, id: OrderId) -> Result<Option<Order>>;

    /// Finds the order a replayed checkout submission originally created.
    async fn find_by_idempotency_key(&self, buyer_id: BuyerId, key: &str)
    -> Result<Option<Order>>;

    /// Persists a mutated order with a compare-and-swap on its version.
    ///
    /// Returns the new version stamp; the caller should apply it with
    /// `set_version`. Fails with `VersionConflict` when the stored stamp no
    /// longer matches `order.version()`.
    async fn update(&self, order: &Order) -> Result<Version>;
}

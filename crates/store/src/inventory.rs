//! Inventory ledger repository contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ReferenceNumber, VariantId};
use domain::{Availability, StockLevel, StockMovement};

use crate::Result;

/// Persistence for the stock ledger and per-variant counters.
///
/// Every counter mutation writes exactly one ledger row per affected
/// variant in the same unit of work. Commit and release are idempotent per
/// reference number: rows already marked reversed are skipped, so retrying
/// or double-invoking from the sweeper and the success handler is safe.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Creates or replaces a variant's counter row (seeding and admin).
    async fn put_level(&self, level: StockLevel) -> Result<()>;

    /// Reads a variant's counters.
    async fn level(&self, variant_id: VariantId) -> Result<Option<StockLevel>>;

    /// Reads a variant's availability snapshot.
    async fn availability(&self, variant_id: VariantId) -> Result<Option<Availability>>;

    /// Reserves stock under a reference number.
    ///
    /// Fails with `InsufficientStock` when `on_hand - reserved < quantity`;
    /// unlimited variants succeed without touching counters or the ledger.
    async fn reserve(
        &self,
        variant_id: VariantId,
        quantity: i64,
        reference: &ReferenceNumber,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Converts all open reservations under a reference into sales.
    ///
    /// Returns the number of reservations committed; zero on a retry.
    async fn commit(&self, reference: &ReferenceNumber) -> Result<u64>;

    /// Releases all open reservations under a reference without selling.
    ///
    /// Returns the number of reservations released; zero on a retry or when
    /// the reservations were already committed (sold), which the caller
    /// must treat as a no-op rather than an error.
    async fn release(&self, reference: &ReferenceNumber) -> Result<u64>;

    /// Administrative stock correction, always logged.
    async fn adjust(&self, variant_id: VariantId, delta: i64) -> Result<()>;

    /// Restores stock from a returned order, logged under its reference.
    async fn restock_return(
        &self,
        variant_id: VariantId,
        quantity: i64,
        reference: &ReferenceNumber,
    ) -> Result<()>;

    /// All ledger rows under a reference, oldest first.
    async fn movements_for(&self, reference: &ReferenceNumber) -> Result<Vec<StockMovement>>;

    /// Distinct references with open reservations whose expiry has passed.
    async fn expired_references(&self, now: DateTime<Utc>) -> Result<Vec<ReferenceNumber>>;
}

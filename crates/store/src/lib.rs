//! Persistence layer for the order-fulfillment engine.
//!
//! Each aggregate has its own repository trait with the concurrency
//! strategy of that aggregate explicit in the contract: orders and
//! discount codes carry an optimistic version stamp, discount application
//! and inventory counter updates run under a row-level lock, and every
//! inventory write pairs a ledger row with its counter update in one unit
//! of work.
//!
//! Two back ends implement all four traits: [`InMemoryStore`] for tests
//! and development, [`PostgresStore`] for production.

mod cache;
mod discounts;
mod error;
mod inventory;
mod memory;
mod orders;
mod payments;
mod postgres;
mod retry;

pub use cache::AvailabilityCache;
pub use discounts::DiscountStore;
pub use error::{Result, StoreError};
pub use inventory::InventoryStore;
pub use memory::InMemoryStore;
pub use orders::OrderStore;
pub use payments::PaymentStore;
pub use postgres::PostgresStore;
pub use retry::with_retry;

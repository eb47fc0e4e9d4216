//! Domain layer for the order-fulfillment consistency engine.
//!
//! Four independently persisted aggregates live here:
//! - [`order`] — the commercial record and its status machine
//! - [`payment`] — one transaction per attempted gateway charge
//! - [`inventory`] — the stock-movement ledger and per-variant counters
//! - [`discount`] — usage-counted codes with per-user and global limits
//!
//! Aggregates never call each other. An order records intent as
//! [`order::OrderEvent`]s; the fulfillment layer drains those events and
//! drives the cross-aggregate effects.

pub mod discount;
mod error;
pub mod inventory;
pub mod order;
pub mod payment;

pub use discount::{DiscountCode, DiscountError, DiscountUsage, DiscountValue, UsageState};
pub use error::DomainError;
pub use inventory::{
    Availability, InventoryError, MovementKind, StockLevel, StockMovement,
};
pub use order::{Order, OrderError, OrderEvent, OrderItem, OrderStatus};
pub use payment::{PaymentError, PaymentStatus, PaymentTransaction};

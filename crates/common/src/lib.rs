//! Shared value types for the order-fulfillment engine.
//!
//! Typed identifiers prevent mixing up the many UUID-based ids that flow
//! through the saga, `Money` keeps all amounts in integer cents, `Version`
//! carries the optimistic-concurrency stamp, and `ReferenceNumber` is the
//! string that correlates an order with its inventory movements.

mod ids;
mod money;
mod reference;
mod version;

pub use ids::{BuyerId, DiscountCodeId, OrderId, PaymentId, ShippingMethodId, VariantId};
pub use money::Money;
pub use reference::ReferenceNumber;
pub use version::Version;

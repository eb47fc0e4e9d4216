//! Fulfillment orchestration for the order engine.
//!
//! Coordinates the four aggregates through direct calls after each local
//! write commits:
//! 1. Checkout reserves stock and applies the discount before the order row
//!    exists, compensating on any failure.
//! 2. The payment flow charges through the gateway outside the database and
//!    verifies callbacks idempotently.
//! 3. Payment success commits the reservations, confirms the discount, and
//!    advances the order; cancellation runs the reverse compensations.
//! 4. Background sweepers expire stale payments and lapsed reservations.

pub mod checkout;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod payments;
pub mod services;
pub mod sweeper;

pub use checkout::{CheckoutItem, CheckoutRequest, PlacedOrder};
pub use config::FulfillmentConfig;
pub use error::{FulfillmentError, Result};
pub use orchestrator::FulfillmentService;
pub use services::{
    AuditSink, GatewayVerification, InMemoryAuditSink, InMemoryGateway,
    InMemoryNotificationSender, NotificationSender, PaymentGateway,
};
pub use sweeper::ExpirySweeper;

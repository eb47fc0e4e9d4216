//! External collaborator traits and in-memory implementations.

pub mod audit;
pub mod gateway;
pub mod notifications;

pub use audit::{AuditEntry, AuditSink, InMemoryAuditSink};
pub use gateway::{GatewayVerification, InMemoryGateway, PaymentGateway};
pub use notifications::{InMemoryNotificationSender, NotificationSender};

//! Notification sender trait and in-memory implementation.
//!
//! Notifications are fire and forget: the orchestrator logs a failure and
//! moves on, they never fail or delay a state transition.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;
use domain::{OrderStatus, PaymentStatus};

use crate::error::FulfillmentError;

/// Trait for buyer-facing notifications.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Notifies the buyer of an order status change.
    async fn order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<(), FulfillmentError>;

    /// Notifies the buyer of a payment outcome.
    async fn payment_result(
        &self,
        order_id: OrderId,
        status: PaymentStatus,
    ) -> Result<(), FulfillmentError>;
}

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    sent: Vec<String>,
    fail_on_send: bool,
}

/// In-memory notification sender for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationSender {
    state: Arc<RwLock<InMemoryNotificationState>>,
}

impl InMemoryNotificationSender {
    /// Creates a new in-memory sender.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the sender to fail on the next send.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Returns the messages sent so far.
    pub fn sent(&self) -> Vec<String> {
        self.state.read().unwrap().sent.clone()
    }
}

#[async_trait]
impl NotificationSender for InMemoryNotificationSender {
    async fn order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<(), FulfillmentError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_send {
            return Err(FulfillmentError::Notification(
                "delivery failed".to_string(),
            ));
        }
        state.sent.push(format!("order {order_id} is {status}"));
        Ok(())
    }

    async fn payment_result(
        &self,
        order_id: OrderId,
        status: PaymentStatus,
    ) -> Result<(), FulfillmentError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_send {
            return Err(FulfillmentError::Notification(
                "delivery failed".to_string(),
            ));
        }
        state
            .sent
            .push(format!("payment for order {order_id}: {status}"));
        Ok(())
    }
}

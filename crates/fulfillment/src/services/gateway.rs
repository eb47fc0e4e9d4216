//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::Money;

use crate::error::FulfillmentError;

/// The gateway's answer to a verification request.
#[derive(Debug, Clone)]
pub struct GatewayVerification {
    /// Whether the charge went through.
    pub ok: bool,
    /// The amount the gateway reports having charged.
    pub amount: Money,
    /// Gateway-side reference for a completed charge.
    pub ref_id: Option<String>,
    /// Masked card number, when the gateway shares it.
    pub card_mask: Option<String>,
}

/// Trait for payment gateway operations.
///
/// Calls never run inside a database transaction; a slow gateway must not
/// hold locks.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Requests a charge and returns the gateway authority string.
    async fn initiate(
        &self,
        amount: Money,
        callback_url: &str,
    ) -> Result<String, FulfillmentError>;

    /// Verifies the outcome of a charge after the callback arrives.
    async fn verify(
        &self,
        authority: &str,
        expected: Money,
    ) -> Result<GatewayVerification, FulfillmentError>;
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    charges: HashMap<String, Money>,
    next_id: u32,
    fail_on_initiate: bool,
    decline_on_verify: bool,
    misreport_amount: Option<Money>,
}

/// In-memory payment gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to reject the next initiate call.
    pub fn set_fail_on_initiate(&self, fail: bool) {
        self.state.write().unwrap().fail_on_initiate = fail;
    }

    /// Configures the gateway to decline on verification.
    pub fn set_decline_on_verify(&self, decline: bool) {
        self.state.write().unwrap().decline_on_verify = decline;
    }

    /// Makes the gateway report a wrong amount on verification.
    pub fn set_misreport_amount(&self, amount: Option<Money>) {
        self.state.write().unwrap().misreport_amount = amount;
    }

    /// Returns the number of initiated charges.
    pub fn charge_count(&self) -> usize {
        self.state.read().unwrap().charges.len()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn initiate(
        &self,
        amount: Money,
        _callback_url: &str,
    ) -> Result<String, FulfillmentError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_initiate {
            return Err(FulfillmentError::Gateway(
                "Gateway rejected the charge request".to_string(),
            ));
        }

        state.next_id += 1;
        let authority = format!("AUTH-{:06}", state.next_id);
        state.charges.insert(authority.clone(), amount);

        Ok(authority)
    }

    async fn verify(
        &self,
        authority: &str,
        _expected: Money,
    ) -> Result<GatewayVerification, FulfillmentError> {
        let state = self.state.read().unwrap();

        let Some(&amount) = state.charges.get(authority) else {
            return Ok(GatewayVerification {
                ok: false,
                amount: Money::zero(),
                ref_id: None,
                card_mask: None,
            });
        };

        if state.decline_on_verify {
            return Ok(GatewayVerification {
                ok: false,
                amount,
                ref_id: None,
                card_mask: None,
            });
        }

        Ok(GatewayVerification {
            ok: true,
            amount: state.misreport_amount.unwrap_or(amount),
            ref_id: Some(format!("REF-{authority}")),
            card_mask: Some("****1234".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn initiate_and_verify() {
        let gateway = InMemoryGateway::new();
        let amount = Money::from_cents(5000);

        let authority = gateway.initiate(amount, "http://cb").await.unwrap();
        assert!(authority.starts_with("AUTH-"));

        let verification = gateway.verify(&authority, amount).await.unwrap();
        assert!(verification.ok);
        assert_eq!(verification.amount, amount);
        assert!(verification.ref_id.is_some());
    }

    #[tokio::test]
    async fn fail_on_initiate() {
        let gateway = InMemoryGateway::new();
        gateway.set_fail_on_initiate(true);

        let result = gateway.initiate(Money::from_cents(5000), "http://cb").await;
        assert!(matches!(result, Err(FulfillmentError::Gateway(_))));
        assert_eq!(gateway.charge_count(), 0);
    }

    #[tokio::test]
    async fn unknown_authority_is_not_ok() {
        let gateway = InMemoryGateway::new();
        let verification = gateway
            .verify("AUTH-999999", Money::from_cents(100))
            .await
            .unwrap();
        assert!(!verification.ok);
    }

    #[tokio::test]
    async fn declined_verification() {
        let gateway = InMemoryGateway::new();
        let amount = Money::from_cents(5000);
        let authority = gateway.initiate(amount, "http://cb").await.unwrap();

        gateway.set_decline_on_verify(true);
        let verification = gateway.verify(&authority, amount).await.unwrap();
        assert!(!verification.ok);
    }
}

//! In-memory store implementation for testing and development.
//!
//! A single write lock over the whole state gives every operation the same
//! unit-of-work atomicity the Postgres back end gets from transactions, and
//! serializes discount application the way the row lock does.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BuyerId, Money, OrderId, PaymentId, ReferenceNumber, VariantId, Version};
use domain::{
    Availability, DiscountCode, DiscountUsage, MovementKind, Order, PaymentStatus,
    PaymentTransaction, StockLevel, StockMovement,
};
use tokio::sync::RwLock;

use crate::{
    DiscountStore, InventoryStore, OrderStore, PaymentStore, Result, StoreError,
};

#[derive(Default)]
struct State {
    orders: HashMap<OrderId, Order>,
    payments: HashMap<PaymentId, PaymentTransaction>,
    levels: HashMap<VariantId, StockLevel>,
    movements: Vec<StockMovement>,
    codes: HashMap<String, DiscountCode>,
    usages: HashMap<OrderId, DiscountUsage>,
}

/// In-memory implementation of all four repository traits.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of ledger rows, for tests.
    pub async fn movement_count(&self) -> usize {
        self.state.read().await.movements.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;

        let duplicate = state.orders.values().any(|existing| {
            existing.buyer_id() == order.buyer_id()
                && existing.idempotency_key() == order.idempotency_key()
        });
        if duplicate {
            return Err(StoreError::DuplicateKey {
                entity: "order",
                key: order.idempotency_key().to_string(),
            });
        }

        state.orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn find_by_idempotency_key(
        &self,
        buyer_id: BuyerId,
        key: &str,
    ) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .find(|o| o.buyer_id() == buyer_id && o.idempotency_key() == key)
            .cloned())
    }

    async fn update(&self, order: &Order) -> Result<Version> {
        let mut state = self.state.write().await;

        let stored = state
            .orders
            .get_mut(&order.id())
            .ok_or_else(|| StoreError::NotFound {
                entity: "order",
                id: order.id().to_string(),
            })?;

        if stored.version() != order.version() {
            return Err(StoreError::VersionConflict {
                entity: "order",
                id: order.id().to_string(),
            });
        }

        let new_version = order.version().next();
        let mut next = order.clone();
        next.set_version(new_version);
        *stored = next;
        Ok(new_version)
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn insert(&self, transaction: &PaymentTransaction) -> Result<()> {
        let mut state = self.state.write().await;

        if state
            .payments
            .values()
            .any(|p| p.authority() == transaction.authority())
        {
            return Err(StoreError::DuplicateKey {
                entity: "payment",
                key: transaction.authority().to_string(),
            });
        }

        state.payments.insert(transaction.id(), transaction.clone());
        Ok(())
    }

    async fn find(&self, id: PaymentId) -> Result<Option<PaymentTransaction>> {
        Ok(self.state.read().await.payments.get(&id).cloned())
    }

    async fn find_by_authority(&self, authority: &str) -> Result<Option<PaymentTransaction>> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .values()
            .find(|p| p.authority() == authority)
            .cloned())
    }

    async fn has_succeeded_for_order(&self, order_id: OrderId) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .values()
            .any(|p| p.order_id() == order_id && p.status() == PaymentStatus::Succeeded))
    }

    async fn update(&self, transaction: &PaymentTransaction) -> Result<()> {
        let mut state = self.state.write().await;

        if transaction.status() == PaymentStatus::Succeeded {
            let other_success = state.payments.values().any(|p| {
                p.order_id() == transaction.order_id()
                    && p.id() != transaction.id()
                    && p.status() == PaymentStatus::Succeeded
            });
            if other_success {
                return Err(StoreError::DuplicateKey {
                    entity: "payment success",
                    key: transaction.order_id().to_string(),
                });
            }
        }

        if !state.payments.contains_key(&transaction.id()) {
            return Err(StoreError::NotFound {
                entity: "payment",
                id: transaction.id().to_string(),
            });
        }
        state.payments.insert(transaction.id(), transaction.clone());
        Ok(())
    }

    async fn find_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PaymentTransaction>> {
        let state = self.state.read().await;
        let mut stale: Vec<PaymentTransaction> = state
            .payments
            .values()
            .filter(|p| p.status() == PaymentStatus::Pending && p.created_at() < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|p| p.created_at());
        stale.truncate(limit as usize);
        Ok(stale)
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn put_level(&self, level: StockLevel) -> Result<()> {
        let mut state = self.state.write().await;
        state.levels.insert(level.variant_id, level);
        Ok(())
    }

    async fn level(&self, variant_id: VariantId) -> Result<Option<StockLevel>> {
        Ok(self.state.read().await.levels.get(&variant_id).cloned())
    }

    async fn availability(&self, variant_id: VariantId) -> Result<Option<Availability>> {
        let state = self.state.read().await;
        Ok(state.levels.get(&variant_id).map(StockLevel::availability))
    }

    async fn reserve(
        &self,
        variant_id: VariantId,
        quantity: i64,
        reference: &ReferenceNumber,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let level = state
            .levels
            .get_mut(&variant_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "variant",
                id: variant_id.to_string(),
            })?;

        let movement = level.reserve(quantity, reference, expires_at, Utc::now())?;
        if let Some(movement) = movement {
            state.movements.push(movement);
        }
        Ok(())
    }

    async fn commit(&self, reference: &ReferenceNumber) -> Result<u64> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        let open: Vec<StockMovement> = state
            .movements
            .iter()
            .filter(|m| {
                m.kind == MovementKind::Reservation
                    && !m.reversed
                    && m.reference.as_ref() == Some(reference)
            })
            .cloned()
            .collect();

        let mut committed = 0;
        for reservation in open {
            let Some(level) = state.levels.get_mut(&reservation.variant_id) else {
                continue;
            };
            let sale = level.commit_reservation(&reservation, now);
            if let Some(row) = state.movements.iter_mut().find(|m| m.id == reservation.id) {
                row.reversed = true;
            }
            state.movements.push(sale);
            committed += 1;
        }
        Ok(committed)
    }

    async fn release(&self, reference: &ReferenceNumber) -> Result<u64> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        let open: Vec<StockMovement> = state
            .movements
            .iter()
            .filter(|m| {
                m.kind == MovementKind::Reservation
                    && !m.reversed
                    && m.reference.as_ref() == Some(reference)
            })
            .cloned()
            .collect();

        let mut released = 0;
        for reservation in open {
            let Some(level) = state.levels.get_mut(&reservation.variant_id) else {
                continue;
            };
            let release = level.release_reservation(&reservation, now);
            if let Some(row) = state.movements.iter_mut().find(|m| m.id == reservation.id) {
                row.reversed = true;
            }
            state.movements.push(release);
            released += 1;
        }
        Ok(released)
    }

    async fn adjust(&self, variant_id: VariantId, delta: i64) -> Result<()> {
        let mut state = self.state.write().await;
        let level = state
            .levels
            .get_mut(&variant_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "variant",
                id: variant_id.to_string(),
            })?;

        let movement = level.adjust(delta, Utc::now())?;
        state.movements.push(movement);
        Ok(())
    }

    async fn restock_return(
        &self,
        variant_id: VariantId,
        quantity: i64,
        reference: &ReferenceNumber,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let level = state
            .levels
            .get_mut(&variant_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "variant",
                id: variant_id.to_string(),
            })?;

        let movement = level.restock_return(quantity, reference, Utc::now())?;
        state.movements.push(movement);
        Ok(())
    }

    async fn movements_for(&self, reference: &ReferenceNumber) -> Result<Vec<StockMovement>> {
        let state = self.state.read().await;
        let mut rows: Vec<StockMovement> = state
            .movements
            .iter()
            .filter(|m| m.reference.as_ref() == Some(reference))
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.created_at);
        Ok(rows)
    }

    async fn expired_references(&self, now: DateTime<Utc>) -> Result<Vec<ReferenceNumber>> {
        let state = self.state.read().await;
        let mut references = Vec::new();
        for movement in &state.movements {
            if movement.kind == MovementKind::Reservation
                && !movement.reversed
                && movement.expires_at.is_some_and(|at| at <= now)
                && let Some(reference) = &movement.reference
                && !references.contains(reference)
            {
                references.push(reference.clone());
            }
        }
        Ok(references)
    }
}

#[async_trait]
impl DiscountStore for InMemoryStore {
    async fn insert_code(&self, code: &DiscountCode) -> Result<()> {
        let mut state = self.state.write().await;
        let key = code.code().to_string();
        if state.codes.contains_key(&key) {
            return Err(StoreError::DuplicateKey {
                entity: "discount code",
                key,
            });
        }
        state.codes.insert(key, code.clone());
        Ok(())
    }

    async fn find_code(&self, code: &str) -> Result<Option<DiscountCode>> {
        let state = self.state.read().await;
        Ok(state.codes.get(&DiscountCode::normalize(code)).cloned())
    }

    async fn apply(
        &self,
        code: &str,
        buyer_id: BuyerId,
        order_id: OrderId,
        order_total: Money,
        now: DateTime<Utc>,
    ) -> Result<DiscountUsage> {
        // The write lock over the whole state stands in for the row lock:
        // validate-and-increment is atomic with respect to other appliers.
        let mut state = self.state.write().await;

        let key = DiscountCode::normalize(code);
        let code_id = state
            .codes
            .get(&key)
            .map(|c| c.id())
            .ok_or_else(|| StoreError::NotFound {
                entity: "discount code",
                id: key.clone(),
            })?;

        let prior_user_uses = state
            .usages
            .values()
            .filter(|u| u.code_id == code_id && u.buyer_id == buyer_id)
            .count() as u32;

        let stored = state
            .codes
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound {
                entity: "discount code",
                id: key.clone(),
            })?;
        stored.validate(now, order_total, prior_user_uses)?;

        let amount = stored.amount_for(order_total);
        stored.record_use();
        let new_version = stored.version().next();
        stored.set_version(new_version);

        let usage = DiscountUsage::new(code_id, order_id, buyer_id, amount, now);
        state.usages.insert(order_id, usage.clone());
        Ok(usage)
    }

    async fn confirm_usage(&self, order_id: OrderId) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .usages
            .get_mut(&order_id)
            .is_some_and(DiscountUsage::confirm))
    }

    async fn cancel_usage(&self, order_id: OrderId) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .usages
            .get_mut(&order_id)
            .is_some_and(DiscountUsage::cancel))
    }

    async fn usage_for_order(&self, order_id: OrderId) -> Result<Option<DiscountUsage>> {
        Ok(self.state.read().await.usages.get(&order_id).cloned())
    }
}

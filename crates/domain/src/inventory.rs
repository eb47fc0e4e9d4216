//! Inventory stock-movement ledger and per-variant counters.
//!
//! Every counter mutation is paired with a ledger row in the same unit of
//! work by the store layer. The counter math and row construction live here
//! so the in-memory and Postgres back ends agree on the semantics.

use chrono::{DateTime, Utc};
use common::{ReferenceNumber, VariantId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The kind of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementKind {
    /// Stock set aside for a pending order; `reserved` grows.
    Reservation,

    /// A committed reservation; `stock` and `reserved` both shrink.
    Sale,

    /// A released reservation; `reserved` shrinks, stock untouched.
    Release,

    /// Administrative stock correction.
    Adjustment,

    /// Stock restored by a returned order.
    Return,
}

impl MovementKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Reservation => "Reservation",
            MovementKind::Sale => "Sale",
            MovementKind::Release => "Release",
            MovementKind::Adjustment => "Adjustment",
            MovementKind::Return => "Return",
        }
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MovementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Reservation" => Ok(MovementKind::Reservation),
            "Sale" => Ok(MovementKind::Sale),
            "Release" => Ok(MovementKind::Release),
            "Adjustment" => Ok(MovementKind::Adjustment),
            "Return" => Ok(MovementKind::Return),
            other => Err(format!("unknown movement kind: {other}")),
        }
    }
}

/// One row of the append-only stock-movement ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub variant_id: VariantId,
    pub kind: MovementKind,

    /// Signed quantity change: the stock delta for Sale/Adjustment/Return,
    /// the reserved delta for Reservation/Release.
    pub quantity: i64,

    /// On-hand stock before this movement.
    pub stock_before: i64,

    /// On-hand stock after this movement.
    pub stock_after: i64,

    /// Groups movements belonging to one logical operation, e.g. an order.
    pub reference: Option<ReferenceNumber>,

    /// When a reservation lapses and becomes sweepable.
    pub expires_at: Option<DateTime<Utc>>,

    /// Set once the movement has been committed or released; idempotency
    /// guard for retried commit/release by reference.
    pub reversed: bool,

    pub created_at: DateTime<Utc>,
}

/// Business-rule violations raised by the inventory ledger.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Not enough free stock to reserve.
    #[error("Insufficient stock for variant {variant_id}: requested {requested}, available {available}")]
    InsufficientStock {
        variant_id: VariantId,
        requested: i64,
        available: i64,
    },

    /// Quantities must be positive.
    #[error("Invalid quantity {quantity} for variant {variant_id}")]
    InvalidQuantity { variant_id: VariantId, quantity: i64 },

    /// An adjustment may not take stock below the reserved quantity.
    #[error(
        "Adjustment would take variant {variant_id} to {resulting} on hand with {reserved} reserved"
    )]
    AdjustmentBelowReserved {
        variant_id: VariantId,
        resulting: i64,
        reserved: i64,
    },
}

/// Point-in-time availability of a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub on_hand: i64,
    pub reserved: i64,
    pub available: i64,
    pub in_stock: bool,
    pub unlimited: bool,
}

/// The cached stock/reserved counters for one variant.
///
/// Derived from the ledger but stored on the variant row for fast reads.
/// Invariant for limited variants: `reserved <= on_hand`. Unlimited
/// variants never decrement and never write ledger rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub variant_id: VariantId,
    pub on_hand: i64,
    pub reserved: i64,
    pub unlimited: bool,
}

impl StockLevel {
    /// Creates a limited-stock counter.
    pub fn new(variant_id: VariantId, on_hand: i64) -> Self {
        Self {
            variant_id,
            on_hand,
            reserved: 0,
            unlimited: false,
        }
    }

    /// Creates an unlimited-stock counter.
    pub fn unlimited(variant_id: VariantId) -> Self {
        Self {
            variant_id,
            on_hand: 0,
            reserved: 0,
            unlimited: true,
        }
    }

    /// Free stock, `on_hand - reserved`.
    pub fn available(&self) -> i64 {
        self.on_hand - self.reserved
    }

    /// Snapshot for the availability query.
    pub fn availability(&self) -> Availability {
        Availability {
            on_hand: self.on_hand,
            reserved: self.reserved,
            available: self.available(),
            in_stock: self.unlimited || self.available() > 0,
            unlimited: self.unlimited,
        }
    }

    /// Reserves `quantity` units under `reference`.
    ///
    /// Fails deterministically with `InsufficientStock` when
    /// `on_hand - reserved < quantity`. Unlimited variants succeed without a
    /// ledger row or counter change (returns `None`).
    pub fn reserve(
        &mut self,
        quantity: i64,
        reference: &ReferenceNumber,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<StockMovement>, InventoryError> {
        if quantity <= 0 {
            return Err(InventoryError::InvalidQuantity {
                variant_id: self.variant_id,
                quantity,
            });
        }

        if self.unlimited {
            return Ok(None);
        }

        if self.available() < quantity {
            return Err(InventoryError::InsufficientStock {
                variant_id: self.variant_id,
                requested: quantity,
                available: self.available(),
            });
        }

        self.reserved += quantity;
        Ok(Some(StockMovement {
            id: Uuid::new_v4(),
            variant_id: self.variant_id,
            kind: MovementKind::Reservation,
            quantity,
            stock_before: self.on_hand,
            stock_after: self.on_hand,
            reference: Some(reference.clone()),
            expires_at,
            reversed: false,
            created_at: now,
        }))
    }

    /// Converts an open reservation into a sale.
    ///
    /// The caller must pass an unreversed Reservation row; idempotency by
    /// reference is enforced by the store skipping reversed rows.
    pub fn commit_reservation(
        &mut self,
        reservation: &StockMovement,
        now: DateTime<Utc>,
    ) -> StockMovement {
        debug_assert_eq!(reservation.kind, MovementKind::Reservation);
        debug_assert!(!reservation.reversed);

        let quantity = reservation.quantity;
        let before = self.on_hand;
        self.on_hand -= quantity;
        self.reserved -= quantity;

        StockMovement {
            id: Uuid::new_v4(),
            variant_id: self.variant_id,
            kind: MovementKind::Sale,
            quantity: -quantity,
            stock_before: before,
            stock_after: self.on_hand,
            reference: reservation.reference.clone(),
            expires_at: None,
            reversed: false,
            created_at: now,
        }
    }

    /// Releases an open reservation without selling.
    pub fn release_reservation(
        &mut self,
        reservation: &StockMovement,
        now: DateTime<Utc>,
    ) -> StockMovement {
        debug_assert_eq!(reservation.kind, MovementKind::Reservation);
        debug_assert!(!reservation.reversed);

        let quantity = reservation.quantity;
        self.reserved -= quantity;

        StockMovement {
            id: Uuid::new_v4(),
            variant_id: self.variant_id,
            kind: MovementKind::Release,
            quantity: -quantity,
            stock_before: self.on_hand,
            stock_after: self.on_hand,
            reference: reservation.reference.clone(),
            expires_at: None,
            reversed: false,
            created_at: now,
        }
    }

    /// Applies an administrative stock correction.
    pub fn adjust(
        &mut self,
        delta: i64,
        now: DateTime<Utc>,
    ) -> Result<StockMovement, InventoryError> {
        let resulting = self.on_hand + delta;
        if !self.unlimited && resulting < self.reserved {
            return Err(InventoryError::AdjustmentBelowReserved {
                variant_id: self.variant_id,
                resulting,
                reserved: self.reserved,
            });
        }

        let before = self.on_hand;
        self.on_hand = resulting;
        Ok(StockMovement {
            id: Uuid::new_v4(),
            variant_id: self.variant_id,
            kind: MovementKind::Adjustment,
            quantity: delta,
            stock_before: before,
            stock_after: self.on_hand,
            reference: None,
            expires_at: None,
            reversed: false,
            created_at: now,
        })
    }

    /// Restores stock from a returned order.
    pub fn restock_return(
        &mut self,
        quantity: i64,
        reference: &ReferenceNumber,
        now: DateTime<Utc>,
    ) -> Result<StockMovement, InventoryError> {
        if quantity <= 0 {
            return Err(InventoryError::InvalidQuantity {
                variant_id: self.variant_id,
                quantity,
            });
        }

        let before = self.on_hand;
        self.on_hand += quantity;
        Ok(StockMovement {
            id: Uuid::new_v4(),
            variant_id: self.variant_id,
            kind: MovementKind::Return,
            quantity,
            stock_before: before,
            stock_after: self.on_hand,
            reference: Some(reference.clone()),
            expires_at: None,
            reversed: false,
            created_at: now,
        })
    }
}

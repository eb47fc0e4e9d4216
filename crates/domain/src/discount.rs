//! Discount codes and usage bookkeeping.
//!
//! The `used_count` is a monotonic usage-attempt counter: applying a code
//! increments it under a row lock, and cancelling a usage later does not
//! decrement it back down. The usage row tracks the bookkeeping state
//! (pending / confirmed / cancelled) for reporting.

use chrono::{DateTime, Utc};
use common::{BuyerId, DiscountCodeId, Money, OrderId, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Business-rule violations raised by discount validation.
#[derive(Debug, Error)]
pub enum DiscountError {
    /// The code's activity window has not opened yet.
    #[error("Discount code is not active until {starts_at}")]
    NotYetActive { starts_at: DateTime<Utc> },

    /// The code's activity window has closed.
    #[error("Discount code expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },

    /// The order total is below the code's minimum.
    #[error("Order total {total} is below the {minimum} minimum for this code")]
    BelowMinimum { total: Money, minimum: Money },

    /// The global usage limit has been reached.
    #[error("Discount code usage limit of {limit} reached")]
    UsageLimitReached { limit: u32 },

    /// This buyer has exhausted their per-user limit.
    #[error("Per-user limit of {limit} reached for this code")]
    PerUserLimitReached { limit: u32 },

    /// Percentage discounts must be between 1 and 100.
    #[error("Invalid discount percentage {percent}")]
    InvalidPercent { percent: u32 },
}

/// How a code discounts an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscountValue {
    /// Percentage of the order total, optionally capped.
    Percentage { percent: u32, cap: Option<Money> },

    /// Fixed amount off.
    Fixed { amount: Money },
}

/// A usage-counted discount code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountCode {
    id: DiscountCodeId,
    /// Unique, case-normalized code string.
    code: String,
    value: DiscountValue,
    usage_limit: u32,
    per_user_limit: u32,
    used_count: u32,
    starts_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    min_order_total: Money,
    version: Version,
}

impl DiscountCode {
    /// Creates a new code. The code string is trimmed and uppercased.
    pub fn new(
        code: impl AsRef<str>,
        value: DiscountValue,
        usage_limit: u32,
        per_user_limit: u32,
        starts_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        min_order_total: Money,
    ) -> Result<Self, DiscountError> {
        if let DiscountValue::Percentage { percent, .. } = value
            && !(1..=100).contains(&percent)
        {
            return Err(DiscountError::InvalidPercent { percent });
        }

        Ok(Self {
            id: DiscountCodeId::new(),
            code: Self::normalize(code.as_ref()),
            value,
            usage_limit,
            per_user_limit,
            used_count: 0,
            starts_at,
            expires_at,
            min_order_total,
            version: Version::initial(),
        })
    }

    /// Canonical form of a code string: trimmed, uppercased.
    pub fn normalize(code: &str) -> String {
        code.trim().to_uppercase()
    }

    pub fn id(&self) -> DiscountCodeId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn value(&self) -> DiscountValue {
        self.value
    }

    pub fn usage_limit(&self) -> u32 {
        self.usage_limit
    }

    pub fn per_user_limit(&self) -> u32 {
        self.per_user_limit
    }

    pub fn used_count(&self) -> u32 {
        self.used_count
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Re-validates the code for one application.
    ///
    /// Run inside the row lock so the check and the increment are atomic
    /// with respect to concurrent checkouts.
    pub fn validate(
        &self,
        now: DateTime<Utc>,
        order_total: Money,
        prior_user_uses: u32,
    ) -> Result<(), DiscountError> {
        if now < self.starts_at {
            return Err(DiscountError::NotYetActive {
                starts_at: self.starts_at,
            });
        }
        if now > self.expires_at {
            return Err(DiscountError::Expired {
                expired_at: self.expires_at,
            });
        }
        if order_total < self.min_order_total {
            return Err(DiscountError::BelowMinimum {
                total: order_total,
                minimum: self.min_order_total,
            });
        }
        if self.used_count >= self.usage_limit {
            return Err(DiscountError::UsageLimitReached {
                limit: self.usage_limit,
            });
        }
        if prior_user_uses >= self.per_user_limit {
            return Err(DiscountError::PerUserLimitReached {
                limit: self.per_user_limit,
            });
        }
        Ok(())
    }

    /// Computes the discount amount for an order total.
    ///
    /// Never exceeds the order total itself.
    pub fn amount_for(&self, order_total: Money) -> Money {
        let raw = match self.value {
            DiscountValue::Percentage { percent, cap } => {
                let amount = order_total.percent(percent);
                match cap {
                    Some(cap) => amount.min(cap),
                    None => amount,
                }
            }
            DiscountValue::Fixed { amount } => amount,
        };
        raw.min(order_total)
    }

    /// Counts one application against the usage limit.
    pub fn record_use(&mut self) {
        self.used_count += 1;
    }
}

/// The bookkeeping state of one usage row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UsageState {
    /// Applied at checkout, outcome not yet known.
    #[default]
    Pending,

    /// The owning order's payment succeeded.
    Confirmed,

    /// The owning order was cancelled or its payment failed.
    Cancelled,
}

impl UsageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageState::Pending => "Pending",
            UsageState::Confirmed => "Confirmed",
            UsageState::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for UsageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for UsageState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(UsageState::Pending),
            "Confirmed" => Ok(UsageState::Confirmed),
            "Cancelled" => Ok(UsageState::Cancelled),
            other => Err(format!("unknown usage state: {other}")),
        }
    }
}

/// One order's consumption of a code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountUsage {
    pub id: Uuid,
    pub code_id: DiscountCodeId,
    pub order_id: OrderId,
    pub buyer_id: BuyerId,
    pub amount: Money,
    pub state: UsageState,
    pub created_at: DateTime<Utc>,
}

impl DiscountUsage {
    /// Creates a pending usage row.
    pub fn new(
        code_id: DiscountCodeId,
        order_id: OrderId,
        buyer_id: BuyerId,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            code_id,
            order_id,
            buyer_id,
            amount,
            state: UsageState::Pending,
            created_at: now,
        }
    }

    /// Marks the usage confirmed. Returns false if it was not pending.
    pub fn confirm(&mut self) -> bool {
        if self.state != UsageState::Pending {
            return false;
        }
        self.state = UsageState::Confirmed;
        true
    }

    /// Marks the usage cancelled. Does not free the usage counter.
    /// Returns false if it was not pending.
    pub fn cancel(&mut self) -> bool {
        if self.state != UsageState::Pending {
            return false;
        }
        self.state = UsageState::Cancelled;
        true
    }
}

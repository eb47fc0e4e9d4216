//! Fulfillment tuning knobs.

use chrono::Duration;

/// Time limits and retry bounds for the fulfillment flow.
#[derive(Debug, Clone)]
pub struct FulfillmentConfig {
    /// How long a checkout reservation holds stock before the sweeper may
    /// release it.
    pub reservation_ttl: Duration,

    /// How long a Pending payment may sit before the sweeper expires it.
    pub payment_pending_cutoff: Duration,

    /// Days after delivery during which a return is accepted.
    pub return_window_days: i64,

    /// Callback URL handed to the gateway on initiate.
    pub callback_url: String,

    /// Total attempts for version-conflict retries.
    pub max_retries: u32,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            reservation_ttl: Duration::minutes(30),
            payment_pending_cutoff: Duration::minutes(30),
            return_window_days: 7,
            callback_url: "http://localhost:3000/payments/callback".to_string(),
            max_retries: 3,
        }
    }
}

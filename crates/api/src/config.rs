//! Application configuration loaded from environment variables.

use chrono::Duration;
use fulfillment::FulfillmentConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `DATABASE_URL` — Postgres connection string; in-memory store when unset
/// - `RESERVATION_TTL_MINUTES` — inventory hold lifetime (default: `30`)
/// - `PAYMENT_CUTOFF_MINUTES` — pending payment expiry (default: `30`)
/// - `SWEEP_INTERVAL_SECS` — expiry sweeper cadence (default: `60`)
/// - `AVAILABILITY_CACHE_TTL_SECS` — browse cache TTL (default: `5`)
/// - `CALLBACK_URL` — gateway redirect target
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub reservation_ttl_minutes: i64,
    pub payment_cutoff_minutes: i64,
    pub sweep_interval_secs: u64,
    pub availability_cache_ttl_secs: u64,
    pub callback_url: String,
    pub log_level: String,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 3000),
            database_url: std::env::var("DATABASE_URL").ok(),
            reservation_ttl_minutes: env_parse("RESERVATION_TTL_MINUTES", 30),
            payment_cutoff_minutes: env_parse("PAYMENT_CUTOFF_MINUTES", 30),
            sweep_interval_secs: env_parse("SWEEP_INTERVAL_SECS", 60),
            availability_cache_ttl_secs: env_parse("AVAILABILITY_CACHE_TTL_SECS", 5),
            callback_url: std::env::var("CALLBACK_URL")
                .unwrap_or_else(|_| "http://localhost:3000/payments/callback".to_string()),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The fulfillment-layer view of this configuration.
    pub fn fulfillment(&self) -> FulfillmentConfig {
        FulfillmentConfig {
            reservation_ttl: Duration::minutes(self.reservation_ttl_minutes),
            payment_pending_cutoff: Duration::minutes(self.payment_cutoff_minutes),
            callback_url: self.callback_url.clone(),
            ..FulfillmentConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: None,
            reservation_ttl_minutes: 30,
            payment_cutoff_minutes: 30,
            sweep_interval_secs: 60,
            availability_cache_ttl_secs: 5,
            callback_url: "http://localhost:3000/payments/callback".to_string(),
            log_level: "info".to_string(),
        }
    }
}

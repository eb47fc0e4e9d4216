//! Bounded retry for contended store operations.

use std::future::Future;
use std::time::Duration;

use crate::{Result, StoreError};

const BASE_DELAY_MS: u64 = 10;

/// Runs `operation`, retrying on retryable and transient store errors.
///
/// Retries up to `max_attempts` total attempts with a short exponential
/// backoff between them. The closure must re-read any state it mutates, so
/// a version conflict retry sees the winner's write. Business rule errors
/// and duplicate keys are returned immediately.
pub async fn with_retry<T, F, Fut>(name: &'static str, max_attempts: u32, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if (err.is_retryable() || err.is_transient()) && attempt < max_attempts => {
                tracing::warn!(
                    operation = name,
                    attempt,
                    error = %err,
                    "retrying store operation"
                );
                metrics::counter!("store_retries_total", "operation" => name).increment(1);

                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

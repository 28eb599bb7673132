//! Exponential backoff for provider calls.

use std::future::Future;
use std::time::Duration;

use codedoc_shared::Result;
use tracing::{debug, warn};

/// Run `op` up to `max_retries + 1` times.
///
/// Only errors flagged retryable are retried; the wait before attempt `n`
/// is `base_delay * 2^(n-1)`.
pub async fn with_retry<T, F, Fut>(
    provider: &str,
    max_retries: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            let delay = base_delay.saturating_mul(2u32.saturating_pow(attempt - 1));
            debug!(provider, attempt, delay_ms = delay.as_millis() as u64, "retrying request");
            tokio::time::sleep(delay).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                warn!(provider, attempt, error = %e, "request failed, will retry");
            }
            Err(e) => return Err(e),
        }
        attempt += 1;
    }
}

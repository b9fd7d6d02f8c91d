//! Back-off retries for individual backend calls.
//!
//! Only [`BackendError::is_transient`] failures are retried. A rejected row
//! or an expired session fails on the first attempt, so the logger can queue
//! the fix without waiting out a back-off schedule.

use std::future::Future;
use std::time::Duration;

use crate::error::BackendError;

/// Upper bound on a single back-off sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Sleep before retry number `retry` (1-based): `base_ms · 2^(retry-1)`,
/// capped at [`MAX_BACKOFF`], then scaled by `jitter` (expected in `0.75..=1.25`).
fn backoff_delay(retry: u32, base_ms: u64, jitter: f64) -> Duration {
    let exponent = retry.saturating_sub(1).min(16);
    let nominal = Duration::from_millis(base_ms.saturating_mul(1u64 << exponent)).min(MAX_BACKOFF);
    nominal.mul_f64(jitter.clamp(0.0, 2.0))
}

/// Runs `operation`, then up to `max_retries` more times while it fails
/// transiently, sleeping with exponential back-off and ±25 % jitter between
/// attempts. Returns the first success or the last error.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut retry = 0u32;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if retry == max_retries || !err.is_transient() {
            return Err(err);
        }
        retry += 1;
        let delay = backoff_delay(retry, backoff_base_ms, 0.75 + rand::random::<f64>() * 0.5);
        tracing::warn!(
            retry,
            max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "backend call failed transiently; backing off"
        );
        tokio::time::sleep(delay).await;
    }
}

use std::time::Duration;

pub(crate) const RETRY_BACKOFF_BASE_MS: u64 = 100;
pub(crate) const RETRY_BACKOFF_MAX_MS: u64 = 1_000;

/// Only failures to reach the upstream are retried. Once it answered, any
/// status (including 429/5xx) goes back to the caller untouched.
#[inline]
pub(crate) fn should_retry_transport_error(err: &reqwest::Error) -> bool {
    err.is_connect()
}

#[inline]
pub(crate) fn retry_backoff_delay(attempt: u32) -> Duration {
    let shift = attempt.min(10);
    let multiplier = 1_u64 << shift;
    Duration::from_millis(
        RETRY_BACKOFF_BASE_MS
            .saturating_mul(multiplier)
            .min(RETRY_BACKOFF_MAX_MS),
    )
}

//! Retry timing shared by the HTTP clients.

use std::time::Duration;

/// Delay before the first retry
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Upper bound for any single retry delay
pub const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Delay before retry number `retry` (1-based): 100ms, 200ms, 400ms, ...
/// capped at [`MAX_BACKOFF`].
pub fn backoff_delay(retry: u32) -> Duration {
    let shift = retry.saturating_sub(1).min(16);
    INITIAL_BACKOFF
        .saturating_mul(1u32 << shift)
        .min(MAX_BACKOFF)
}

/// HTTP statuses worth retrying: rate limiting and server errors.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

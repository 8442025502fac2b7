//! Bounded polling with backoff.
//!
//! Used wherever the remote service is eventually consistent: waiting for a
//! new index to be listed and for upserted vectors to become visible.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use vecquery_core::config::PollingSettings;
use vecquery_core::{AppError, AppResult};

/// Consecutive check errors tolerated before the error is returned
const MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Timing for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay after the first unsuccessful check
    pub interval: Duration,
    /// Upper bound for the doubling delay
    pub max_interval: Duration,
    /// Total time allowed, checks included
    pub timeout: Duration,
}

impl PollPolicy {
    /// Policy for index readiness.
    pub fn readiness(settings: &PollingSettings) -> Self {
        Self {
            interval: settings.interval(),
            max_interval: settings.max_interval(),
            timeout: settings.ready_timeout(),
        }
    }

    /// Policy for write visibility.
    pub fn visibility(settings: &PollingSettings) -> Self {
        Self {
            interval: settings.interval(),
            max_interval: settings.max_interval(),
            timeout: settings.visibility_timeout(),
        }
    }
}

/// Call `check` until it yields `Some`, sleeping with exponential backoff
/// between attempts.
///
/// Fails with `AppError::Timeout` once `policy.timeout` has elapsed. Probe
/// errors are retried up to three in a row; the third is returned. Dropping
/// the returned future cancels the wait.
pub async fn poll_until<T, F, Fut>(what: &str, policy: PollPolicy, mut check: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<Option<T>>>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut delay = policy.interval;
    let mut attempts = 0u32;
    let mut consecutive_errors = 0u32;

    loop {
        attempts += 1;

        let remaining = deadline.saturating_duration_since(Instant::now());
        let outcome = match tokio::time::timeout(remaining, check()).await {
            Ok(outcome) => outcome,
            Err(_) => break,
        };

        match outcome {
            Ok(Some(value)) => {
                tracing::debug!(
                    "{} after {} attempt(s) in {:?}",
                    what,
                    attempts,
                    started.elapsed()
                );
                return Ok(value);
            }
            Ok(None) => consecutive_errors = 0,
            Err(e) => {
                consecutive_errors += 1;
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    return Err(e);
                }
                tracing::warn!("Probe for '{}' failed ({}), retrying", what, e);
            }
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }

        tracing::trace!("Waiting {:?} before next check for '{}'", delay, what);
        tokio::time::sleep(delay.min(deadline - now)).await;
        delay = (delay * 2).min(policy.max_interval);
    }

    Err(AppError::Timeout(format!(
        "{} did not happen within {:?} ({} attempts)",
        what, policy.timeout, attempts
    )))
}

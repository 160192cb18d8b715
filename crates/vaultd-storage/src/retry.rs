//! Retry executor for transient database faults.
//!
//! Only [`StoreError::Connection`] is eligible: semantic failures (unique or
//! foreign-key violations, missing rows) must surface to the caller
//! unchanged, since re-running them risks duplicate side effects.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::StoreError;

/// Linear backoff policy: sleep `initial_delay`, then grow the sleep by
/// `increment` before each further attempt.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Number of retries after the initial attempt.
    pub attempts: u32,
    pub initial_delay: Duration,
    pub increment: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_secs(1),
            increment: Duration::from_secs(2),
        }
    }
}

/// Run `op`, re-running it on transient connection errors per `policy`.
///
/// The backoff sleep races against `cancel`; on cancellation the last
/// observed error is returned instead of waiting out the budget. Dropping
/// the returned future (peer cancellation) aborts an in-flight sleep as
/// well.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut last = match op().await {
        Ok(value) => return Ok(value),
        Err(err) if !err.is_transient() => return Err(err),
        Err(err) => err,
    };

    let mut delay = policy.initial_delay;
    for _ in 0..policy.attempts {
        tokio::select! {
            _ = cancel.cancelled() => return Err(last),
            _ = tokio::time::sleep(delay) => {}
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) => last = err,
        }
        delay += policy.increment;
    }

    Err(last)
}

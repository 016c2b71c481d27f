use std::future::Future;
use std::time::Duration;

use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{debug, error, warn};

use crate::config::RetryConfig;

/// Backoff delays between attempts: exponential from `base_delay_ms`, capped, jittered.
pub fn backoff(policy: &RetryConfig) -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor((policy.base_delay_ms / 2).max(1))
        .max_delay(Duration::from_millis(policy.max_delay_ms))
        .map(jitter)
        .take(policy.max_attempts.saturating_sub(1))
}

/// Run `operation` up to `policy.max_attempts` times, sleeping between failures.
///
/// Only `Err` results are retried. Callers decide what counts as an error; the
/// HTTP transport treats any received status as success at this level.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryConfig,
    log_context: &str,
    mut operation: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0usize;

    let result = Retry::spawn(backoff(policy), || {
        attempt += 1;
        let current = attempt;
        let fut = operation();
        async move {
            fut.await.map_err(|e| {
                if current < max_attempts {
                    warn!(
                        "{} failed (attempt {}/{}): {}",
                        log_context, current, max_attempts, e
                    );
                }
                e
            })
        }
    })
    .await;

    match &result {
        Ok(_) if attempt > 1 => debug!("{} succeeded after {} attempts", log_context, attempt),
        Err(e) => error!("{} failed after {} attempts: {}", log_context, attempt, e),
        _ => {}
    }

    result
}

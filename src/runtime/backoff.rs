use crate::runtime::config::EngineConfig;
use anyhow::{anyhow, Result};
use std::future::Future;
use std::time::Duration;
use tokio::task::yield_now;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Exponential backoff bounded by `max_delay` and a finite attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: usize,
}

impl RetryPolicy {
    pub(crate) fn from_config(config: &EngineConfig) -> Self {
        Self {
            initial_delay: config.fetch_initial_backoff(),
            max_delay: config.fetch_max_backoff(),
            max_attempts: config.fetch_max_attempts().max(1),
        }
    }
}

/// Runs `operation` until it succeeds, attempts run out, or `cancellation` fires.
///
/// `on_retry` sees the failed attempt number, the upcoming delay, and the error.
pub(crate) async fn retry_with_backoff<T, F, Fut, L>(
    policy: RetryPolicy,
    cancellation: &CancellationToken,
    mut operation: F,
    mut on_retry: L,
) -> Result<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T>>,
    L: FnMut(usize, Duration, &anyhow::Error),
{
    let mut attempt = 0;
    let mut backoff = policy.initial_delay;

    loop {
        attempt += 1;

        if cancellation.is_cancelled() {
            return Err(anyhow!("retry cancelled"));
        }

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= policy.max_attempts => return Err(err),
            Err(err) => {
                on_retry(attempt, backoff, &err);
                sleep_with_cancellation(backoff, cancellation).await?;
                backoff = next_backoff(backoff, policy.max_delay);
            }
        }
    }
}

async fn sleep_with_cancellation(delay: Duration, cancellation: &CancellationToken) -> Result<()> {
    if delay.is_zero() {
        yield_now().await;
        return Ok(());
    }

    tokio::select! {
        _ = cancellation.cancelled() => Err(anyhow!("retry cancelled")),
        _ = sleep(delay) => Ok(()),
    }
}

fn next_backoff(current: Duration, max_backoff: Duration) -> Duration {
    if current.is_zero() {
        return max_backoff.min(Duration::from_millis(1));
    }

    current.saturating_mul(2).min(max_backoff)
}

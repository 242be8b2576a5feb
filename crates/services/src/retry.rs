//! Bounded retry for calls to remote collaborators, built on `backon`.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ConstantBuilder, ExponentialBuilder, Retryable};
use domains::{DomainError, RemoteError};
use tracing::warn;

/// Delay between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Retry immediately
    None,
    Fixed(Duration),
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f32,
    },
}

/// How many times a remote call is attempted and how long to wait in between.
///
/// Only transient failures (`RemoteError::Unreachable`) are retried. Whatever
/// is left after the budget is spent surfaces as `DomainError::Connectivity`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 2, backoff: Backoff::None }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self { max_attempts: max_attempts.max(1), backoff }
    }

    /// A single attempt, no retry.
    pub fn once() -> Self {
        Self::new(1, Backoff::None)
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, DomainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        // backon counts retries, not attempts
        let retries = self.max_attempts.saturating_sub(1) as usize;
        let attempts = AtomicU32::new(1);
        let notify = |err: &RemoteError, delay: Duration| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            warn!(operation, attempt, error = %err, ?delay, "remote call failed, retrying");
        };

        let result = match &self.backoff {
            Backoff::None => {
                call.retry(ConstantBuilder::default().with_delay(Duration::ZERO).with_max_times(retries))
                    .sleep(tokio::time::sleep)
                    .when(RemoteError::is_transient)
                    .notify(notify)
                    .await
            }
            Backoff::Fixed(delay) => {
                call.retry(ConstantBuilder::default().with_delay(*delay).with_max_times(retries))
                    .sleep(tokio::time::sleep)
                    .when(RemoteError::is_transient)
                    .notify(notify)
                    .await
            }
            Backoff::Exponential { initial, max, multiplier } => {
                let builder = ExponentialBuilder::default()
                    .with_min_delay(*initial)
                    .with_max_delay(*max)
                    .with_factor(*multiplier)
                    .with_max_times(retries);
                call.retry(builder)
                    .sleep(tokio::time::sleep)
                    .when(RemoteError::is_transient)
                    .notify(notify)
                    .await
            }
        };

        result.map_err(|err| {
            let attempts = attempts.load(Ordering::SeqCst);
            DomainError::Connectivity(format!("{operation} failed after {attempts} attempt(s): {err}"))
        })
    }
}

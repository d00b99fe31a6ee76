//! Retry policy for RPC requests
//!
//! Only transient failures (see [`RpcError::is_transient`]) are retried;
//! client and execution errors are returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::error::RpcError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = try once)
    pub max_retries: u32,

    pub initial_backoff: Duration,

    /// Upper bound for the exponential backoff
    pub max_backoff: Duration,

    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_retries: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }

    /// Fail on the first error.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, RpcError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let mut attempts = 0;
        let mut backoff = self.initial_backoff;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempts > 0 {
                        tracing::debug!(
                            target: "reconciler_chain::retry",
                            "Request succeeded after {} attempt(s)",
                            attempts + 1
                        );
                    }
                    return Ok(result);
                }
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => {
                    attempts += 1;

                    if attempts > self.max_retries {
                        tracing::warn!(
                            target: "reconciler_chain::retry",
                            "Request failed after {} attempts: {}",
                            attempts,
                            err
                        );
                        return Err(err);
                    }

                    tracing::debug!(
                        target: "reconciler_chain::retry",
                        "Request failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempts,
                        self.max_retries + 1,
                        err,
                        backoff
                    );

                    sleep(backoff).await;

                    backoff = Duration::from_secs_f64(
                        (backoff.as_secs_f64() * self.backoff_multiplier)
                            .min(self.max_backoff.as_secs_f64()),
                    );
                }
            }
        }
    }
}

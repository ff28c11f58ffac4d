use std::future::Future;
use std::time::Duration;

use crate::models::{SyncError, SyncErrorKind};

/// Explicit retry policy for adapter calls: bounded attempts with
/// exponential backoff. Only `Adapter`-kind failures are retried;
/// authentication and configuration errors surface immediately.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut backoff = self.initial_backoff;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.kind == SyncErrorKind::Adapter && attempt < attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts = attempts,
                        message = %error.message,
                        "adapter call failed, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.mul_f64(self.multiplier.max(1.0));
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

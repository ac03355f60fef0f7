use std::{future::Future, time::Duration};

use crate::error::LibraryError;

/// Capped exponential backoff for read queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Whether another attempt could plausibly succeed.
///
/// Domain errors and constraint violations are the caller's fault and are
/// returned as-is; pool timeouts, busy databases and I/O hiccups are retried.
pub fn is_retryable(err: &anyhow::Error) -> bool {
    for cause in err.chain() {
        if cause.downcast_ref::<LibraryError>().is_some() {
            return false;
        }
        if let Some(db_err) = cause.downcast_ref::<sqlx::Error>() {
            return match db_err {
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
                sqlx::Error::Database(e) => {
                    let msg = e.message();
                    msg.contains("database is locked") || msg.contains("database is busy")
                }
                _ => false,
            };
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return true;
        }
    }
    false
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempts are exhausted.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && is_retryable(&err) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    operation = what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

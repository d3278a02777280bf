//! Retry with exponential backoff for transient catalog failures.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    /// CATALOG_RETRY_ATTEMPTS, CATALOG_RETRY_BASE_MS, CATALOG_RETRY_MAX_MS
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: std::env::var("CATALOG_RETRY_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.max_attempts),
            base_backoff: std::env::var("CATALOG_RETRY_BASE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_backoff),
            max_backoff: std::env::var("CATALOG_RETRY_MAX_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_backoff),
        }
    }

    /// Backoff before the attempt following `attempt` (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Run `f` until it succeeds, fails with a non-transient error, or attempts run out.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, operation: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < policy.max_attempts && is_transient(&e) => {
                let backoff = policy.backoff_after(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {:#}. Retrying in {}ms",
                    operation,
                    attempt,
                    policy.max_attempts,
                    e,
                    backoff.as_millis()
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Connection-level and serialization failures are worth another try.
fn is_transient(e: &anyhow::Error) -> bool {
    if let Some(db_err) = e.downcast_ref::<sqlx::Error>() {
        return matches!(
            db_err,
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
        ) || matches!(
            db_err,
            sqlx::Error::Database(d) if matches!(d.code().as_deref(), Some("40001") | Some("40P01") | Some("53300"))
        );
    }

    let msg = format!("{:#}", e).to_lowercase();
    msg.contains("connection")
        || msg.contains("timeout")
        || msg.contains("timed out")
        || msg.contains("broken pipe")
        || msg.contains("could not serialize")
        || msg.contains("deadlock detected")
        || msg.contains("too many clients")
}

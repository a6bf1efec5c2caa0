//! Retry policy for blob reads.

use crate::error::{MigrateError, Result};
use std::error::Error as _;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Failure messages that indicate a condition worth another attempt.
const TRANSIENT_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "timeout",
    "timed out",
    "temporary failure",
    "no such host",
    "dns error",
    "network is unreachable",
];

/// Linear backoff: the delay before retry `n` is `n * backoff_step`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.backoff_step * retry
    }
}

/// HTTP statuses that are retried.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 429 | 503)
}

/// Whether `err` is a transient failure.
pub fn is_transient(err: &MigrateError) -> bool {
    match err {
        MigrateError::HttpStatus { status, .. } => is_transient_status(*status),
        MigrateError::Http(e) if e.is_timeout() || e.is_connect() => true,
        MigrateError::Io(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::TimedOut
            ) =>
        {
            true
        }
        MigrateError::Http(_) | MigrateError::Io(_) => message_is_transient(&error_chain_text(err)),
        _ => false,
    }
}

/// Whether an error message names a transient condition.
pub fn message_is_transient(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p))
}

fn error_chain_text(err: &MigrateError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Run `op` until it succeeds, fails permanently, or the attempts run out.
///
/// `op` receives the 1-based attempt number.
pub async fn with_retries<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        if attempt > 1 {
            tokio::time::sleep(policy.delay_for(attempt - 1)).await;
        }

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) => {
                warn!("{} attempt {}/{} failed: {}", what, attempt, attempts, e);
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(MigrateError::RetrievalFailed {
        attempts,
        source: Box::new(last_err.unwrap_or(MigrateError::Cancelled)),
    })
}

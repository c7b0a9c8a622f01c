//! Retry with decorrelated-jitter backoff for ticketing calls.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::TicketingClientConfig;
use crate::metrics::TICKETING_RETRIES;

/// Backoff settings for one logical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl From<&TicketingClientConfig> for RetryPolicy {
    fn from(config: &TicketingClientConfig) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Decorrelated jitter: uniform in `[base, previous * 3]`, capped at
    /// `max_delay`.
    pub fn next_delay(&self, previous: Duration) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let upper = (previous.as_secs_f64() * 3.0).max(base);
        let delay = base + (upper - base) * rand_unit();
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// Pseudo-random value in `[0, 1)` from the clock.
fn rand_unit() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

/// Errors that know whether repeating the request could help.
pub trait RetryableError {
    fn retry_decision(&self) -> RetryDecision;
}

/// Run `operation` until it succeeds, fails permanently, or the attempt
/// budget is spent. The last error is returned.
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + std::fmt::Display,
{
    let mut attempt = 1;
    let mut delay = policy.base_delay;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.retry_decision() == RetryDecision::NoRetry => {
                debug!(
                    operation = operation_name,
                    attempt, "Operation failed with non-retryable error: {}", e
                );
                return Err(e);
            }
            Err(e) if attempt >= policy.max_attempts => {
                warn!(
                    operation = operation_name,
                    attempts = attempt,
                    "Operation failed after {} attempts: {}",
                    attempt,
                    e
                );
                return Err(e);
            }
            Err(e) => {
                delay = policy.next_delay(delay);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    backoff_ms = delay.as_millis() as u64,
                    "Retrying after error: {}",
                    e
                );
                TICKETING_RETRIES.with_label_values(&[operation_name]).inc();
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

//! Bounded retries with exponential backoff and per-attempt deadlines.
//!
//! ```text
//! attempt   delay before next attempt (initial=100ms, x2, max=5s)
//! ────────────────────────────────────────────────────────────
//!    1      100ms
//!    2      200ms
//!    3      400ms
//!   ...     ...
//!    7+     5s (capped)
//! ```

use std::future::Future;
use std::time::Duration;

use crate::error::{RetryError, StepError};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_MULTIPLIER: f64 = 2.0;
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Retry and timeout settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Attempt budget for [`RetryExecutor::execute_with_default_retry`].
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Hard deadline for each attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

impl RetryConfig {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Runs operations under a retry budget and per-attempt timeouts.
///
/// Used by the orchestrator for steps that opt into retries and by startup
/// connectivity checks. Fatal errors (see [`StepError::is_retryable`]) stop
/// the loop immediately; timeouts are always retried.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Creates an executor with the given settings.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the executor settings.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `operation` under the configured attempt budget and per-attempt
    /// timeout.
    pub async fn execute_with_default_retry<T, F, Fut>(
        &self,
        name: &str,
        operation: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StepError>>,
    {
        self.execute_with_retry_timeout(
            name,
            self.config.max_attempts,
            self.config.attempt_timeout,
            operation,
        )
        .await
    }

    /// Runs `operation` up to `max_attempts` times using the configured
    /// per-attempt timeout.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        name: &str,
        max_attempts: u32,
        operation: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StepError>>,
    {
        self.execute_with_retry_timeout(name, max_attempts, self.config.attempt_timeout, operation)
            .await
    }

    /// Runs `operation` up to `max_attempts` times, giving each attempt at
    /// most `attempt_timeout`.
    ///
    /// Fails with [`RetryError::Exhausted`] carrying the last underlying
    /// error once the budget is spent or a fatal error is returned.
    #[tracing::instrument(skip(self, operation))]
    pub async fn execute_with_retry_timeout<T, F, Fut>(
        &self,
        name: &str,
        max_attempts: u32,
        attempt_timeout: Duration,
        mut operation: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StepError>>,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            metrics::counter!("saga_retry_attempts_total").increment(1);

            let (error, retry) = match tokio::time::timeout(attempt_timeout, operation()).await {
                Ok(Ok(value)) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Ok(Err(e)) => {
                    let retry = e.is_retryable();
                    (e, retry)
                }
                Err(_) => {
                    let timeout = RetryError::Timeout {
                        operation: name.to_string(),
                        timeout: attempt_timeout,
                    };
                    (StepError::from(timeout), true)
                }
            };

            if !retry || attempt >= max_attempts {
                tracing::warn!(attempt, error = %error, retryable = retry, "giving up on operation");
                return Err(RetryError::Exhausted {
                    operation: name.to_string(),
                    attempts: attempt,
                    last_error: Box::new(error),
                });
            }

            let delay = self.config.delay_for_attempt(attempt);
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "operation failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Runs `future` once, cancelling it if it does not finish within
    /// `timeout`.
    pub async fn execute_with_timeout<Fut>(
        &self,
        name: &str,
        timeout: Duration,
        future: Fut,
    ) -> Result<Fut::Output, RetryError>
    where
        Fut: Future,
    {
        tokio::time::timeout(timeout, future).await.map_err(|_| {
            tracing::warn!(operation = %name, timeout_ms = timeout.as_millis() as u64, "operation timed out");
            RetryError::Timeout {
                operation: name.to_string(),
                timeout,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            multiplier: 2.0,
            attempt_timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_delay_grows_exponentially_and_is_capped() {
        let config = fast_config();
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(10));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(20));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(40));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(40));
        assert_eq!(config.delay_for_attempt(100), Duration::from_millis(40));
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let executor = RetryExecutor::new(fast_config());
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result = executor
            .execute_with_retry("flaky", 3, move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(StepError::retryable("flaky", format!("attempt {n} failed")))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_wraps_last_error() {
        let executor = RetryExecutor::new(fast_config());
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<(), _> = executor
            .execute_with_retry("down", 4, move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Err(StepError::retryable("down", format!("failure {n}")))
                }
            })
            .await;

        match result {
            Err(RetryError::Exhausted {
                attempts,
                last_error,
                ..
            }) => {
                assert_eq!(attempts, 4);
                assert_eq!(last_error.to_string(), "failure 4");
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_retry_uses_configured_budget() {
        let executor = RetryExecutor::new(RetryConfig {
            max_attempts: 5,
            ..fast_config()
        });
        assert_eq!(executor.config().max_attempts, 5);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<(), _> = executor
            .execute_with_default_retry("ping", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(StepError::retryable("ping", "connection refused"))
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(RetryError::Exhausted { attempts: 5, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_stops_immediately() {
        let executor = RetryExecutor::new(fast_config());
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<(), _> = executor
            .execute_with_retry("validate", 5, move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(StepError::fatal("validate", "malformed input"))
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(RetryError::Exhausted { attempts: 1, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_counts_as_failure() {
        let executor = RetryExecutor::new(fast_config());
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result = executor
            .execute_with_retry_timeout("slow", 2, Duration::from_millis(50), move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n == 1 {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    }
                    Ok::<_, StepError>("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_timing_out_is_exhaustion() {
        let executor = RetryExecutor::new(fast_config());

        let result: Result<(), _> = executor
            .execute_with_retry_timeout("hung", 2, Duration::from_millis(50), || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        match result {
            Err(RetryError::Exhausted { last_error, .. }) => {
                assert!(matches!(
                    *last_error,
                    StepError::Retry(ref inner) if matches!(**inner, RetryError::Timeout { .. })
                ));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_with_timeout() {
        let executor = RetryExecutor::default();

        let fast = executor
            .execute_with_timeout("fast", Duration::from_secs(1), async { 42 })
            .await;
        assert_eq!(fast.unwrap(), 42);

        let slow = executor
            .execute_with_timeout("slow", Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
            })
            .await;
        assert!(matches!(slow, Err(RetryError::Timeout { ref operation, .. }) if operation == "slow"));
    }
}

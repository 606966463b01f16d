//! Retry Mechanism Module
//!
//! Exponential backoff around a fallible async operation. Only rate-limit and
//! quota failures are retried; everything else is surfaced on first occurrence.
//! Whatever the outcome, the caller only ever sees a `NormalizedError`.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{NormalizedError, OperationError, normalize};
use crate::utils::cancel::CancelHandle;

/// Retries after the first attempt (4 invocations in total)
pub const MAX_RETRIES: u32 = 3;
/// Delay before the first retry
pub const BASE_DELAY: Duration = Duration::from_millis(100);

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Backoff multiplier (for exponential backoff)
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub use_jitter: bool,
    /// Maximum jitter percentage (0.0 to 1.0)
    pub jitter_factor: f64,
    /// Custom retry condition function
    pub retry_condition: Option<fn(&OperationError) -> bool>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay: BASE_DELAY,
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            use_jitter: false,
            jitter_factor: 0.1,
            retry_condition: None,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of retries after the first attempt
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay before the first retry
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set maximum delay
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier
    pub const fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable jitter
    pub const fn with_jitter(mut self, use_jitter: bool) -> Self {
        self.use_jitter = use_jitter;
        self
    }

    /// Set jitter factor
    pub const fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Set custom retry condition
    pub fn with_retry_condition(mut self, condition: fn(&OperationError) -> bool) -> Self {
        self.retry_condition = Some(condition);
        self
    }

    /// Total invocations the policy allows
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Check if an error should be retried
    pub fn should_retry(&self, error: &OperationError) -> bool {
        if let Some(condition) = self.retry_condition {
            condition(error)
        } else {
            error.is_rate_limited()
        }
    }

    /// Delay after the `attempt`-th failure (1-based): `base * multiplier^(attempt - 1)`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_delay =
            self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);

        let delay = Duration::from_millis(base_delay as u64).min(self.max_delay);

        if self.use_jitter {
            self.add_jitter(delay)
        } else {
            delay
        }
    }

    /// Add jitter to a delay
    fn add_jitter(&self, delay: Duration) -> Duration {
        let jitter_range = delay.as_millis() as f64 * self.jitter_factor;
        if jitter_range <= 0.0 {
            return delay;
        }
        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(-jitter_range..=jitter_range);

        let new_delay = delay.as_millis() as f64 + jitter;
        Duration::from_millis(new_delay.max(0.0) as u64)
    }
}

/// Retry executor that handles the actual retry logic
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create a new retry executor
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or
    /// the retry budget is spent. `label` only appears in diagnostics.
    pub async fn execute<F, Fut, T>(&self, label: &str, operation: F) -> Result<T, NormalizedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        self.run(label, operation, None).await
    }

    /// Like [`execute`](Self::execute), but stops as soon as `cancel` fires.
    ///
    /// The handle is checked before each attempt, and both the in-flight attempt
    /// and any backoff sleep race against it.
    pub async fn execute_cancellable<F, Fut, T>(
        &self,
        label: &str,
        cancel: &CancelHandle,
        operation: F,
    ) -> Result<T, NormalizedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        self.run(label, operation, Some(cancel)).await
    }

    async fn run<F, Fut, T>(
        &self,
        label: &str,
        mut operation: F,
        cancel: Option<&CancelHandle>,
    ) -> Result<T, NormalizedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        let mut attempt: u32 = 0;
        let mut last_error: Option<OperationError> = None;

        while attempt <= self.policy.max_retries {
            if cancel.is_some_and(CancelHandle::is_cancelled) {
                return Err(cancelled(label, attempt));
            }

            let outcome = match cancel {
                Some(handle) => tokio::select! {
                    biased;
                    _ = handle.cancelled() => return Err(cancelled(label, attempt)),
                    outcome = operation() => outcome,
                },
                None => operation().await,
            };

            let error = match outcome {
                Ok(result) => return Ok(result),
                Err(error) => error,
            };

            attempt += 1;
            tracing::warn!(
                target: "statarch::retry",
                label,
                attempt,
                error = %error,
                "[{label}] Attempt {attempt} failed."
            );

            let retry = self.policy.should_retry(&error) && attempt <= self.policy.max_retries;
            last_error = Some(error);
            if !retry {
                break;
            }

            let delay = self.policy.calculate_delay(attempt);
            let delay_ms = delay.as_millis() as u64;
            tracing::info!(
                target: "statarch::retry",
                label,
                attempt,
                delay_ms,
                "Rate limited. Retrying in {delay_ms}ms..."
            );

            match cancel {
                Some(handle) => tokio::select! {
                    biased;
                    _ = handle.cancelled() => return Err(cancelled(label, attempt)),
                    _ = sleep(delay) => {}
                },
                None => sleep(delay).await,
            }
        }

        let normalized = normalize(last_error.as_ref());
        tracing::debug!(
            target: "statarch::retry",
            label,
            attempts = attempt,
            kind = ?normalized.kind(),
            normalized = %normalized,
            "giving up"
        );
        Err(normalized)
    }
}

fn cancelled(label: &str, attempt: u32) -> NormalizedError {
    tracing::debug!(target: "statarch::retry", label, attempt, "retry loop cancelled");
    NormalizedError::cancelled()
}

/// Convenience function to retry an operation with default policy
pub async fn retry_with_default<F, Fut, T>(label: &str, operation: F) -> Result<T, NormalizedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OperationError>>,
{
    let executor = RetryExecutor::new(RetryPolicy::default());
    executor.execute(label, operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, USAGE_LIMIT_MESSAGE};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tracing_test::traced_test;

    fn rate_limited() -> OperationError {
        OperationError::new("Resource Exhausted: Quota exceeded").with_status(429)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_on_third_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let executor = RetryExecutor::new(RetryPolicy::new());
        let started = tokio::time::Instant::now();

        let result = executor
            .execute("questions", || {
                let counter = counter_clone.clone();
                async move {
                    let count = counter.fetch_add(1, Ordering::SeqCst);
                    if count < 2 { Err(rate_limited()) } else { Ok("Success!") }
                }
            })
            .await;

        assert_eq!(result, Ok("Success!"));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(305), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let executor = RetryExecutor::new(RetryPolicy::new().with_max_retries(1));

        let result: Result<(), NormalizedError> = executor
            .execute("blueprint", || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(OperationError::from_status(429))
                }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.message(), USAGE_LIMIT_MESSAGE);
        assert_eq!(err.kind(), ErrorKind::UsageLimit);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_retry_condition() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let policy = RetryPolicy::new().with_retry_condition(|e| e.status == Some(503));
        let executor = RetryExecutor::new(policy);

        let result: Result<(), NormalizedError> = executor
            .execute("overload", || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(OperationError::new("Overloaded").with_status(503))
                }
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Overloaded);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_runs_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let executor = RetryExecutor::new(RetryPolicy::new().with_max_retries(0));
        let result: Result<(), NormalizedError> = executor
            .execute("once", || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(rate_limited())
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_attempts_are_logged() {
        let executor = RetryExecutor::new(RetryPolicy::new().with_base_delay(Duration::from_millis(1)));
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = executor
            .execute("Test1", || {
                let counter = counter_clone.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(rate_limited())
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert!(logs_contain("[Test1] Attempt 1 failed."));
        assert!(logs_contain("Rate limited. Retrying in 1ms..."));
        assert!(!logs_contain("Attempt 2 failed"));
    }

    #[test]
    fn test_delay_calculation() {
        let policy = RetryPolicy::new();

        assert_eq!(policy.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(400));
        assert_eq!(policy.calculate_delay(4), Duration::from_millis(800));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new().with_max_delay(Duration::from_millis(250));

        assert_eq!(policy.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(250));
        assert_eq!(policy.calculate_delay(40), Duration::from_millis(250));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::new().with_jitter(true).with_jitter_factor(0.5);

        for _ in 0..100 {
            let delay = policy.calculate_delay(3);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(600));
        }
    }
}

//! Public Retry API Facade
//!
//! - Simple defaults: `retry` uses the default policy (3 retries, 100ms base delay)
//! - Opt-in control: `RetryOptions` carries a policy and an optional cancel handle
//! - Fan-out: `retry_pair` runs two retried requests concurrently, the way a
//!   topic page requests its practice questions and its blueprint together
//!
//! Example
//! ```rust,no_run
//! use statarch::retry_api::{retry, retry_with, RetryOptions};
//! use statarch::error::{NormalizedError, OperationError};
//!
//! # async fn generate() -> Result<String, OperationError> { Ok("ok".into()) }
//! # async fn example() -> Result<(), NormalizedError> {
//! let questions = retry("questions", || generate()).await?;
//!
//! let options = RetryOptions::new().with_max_retries(5);
//! let blueprint = retry_with("blueprint", || generate(), options).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{NormalizedError, OperationError, normalize};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::utils::cancel::CancelHandle;

/// Unified retry options
#[derive(Debug, Clone, Default)]
pub struct RetryOptions {
    pub policy: RetryPolicy,
    /// Stops the retry loop early when cancelled
    pub cancel: Option<CancelHandle>,
}

impl RetryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options built from validated configuration
    pub fn from_config(config: RetryConfig) -> Self {
        Self {
            policy: config.into_policy(),
            cancel: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.policy = self.policy.with_max_retries(max_retries);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.policy = self.policy.with_base_delay(delay);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Retry with the default policy
pub async fn retry<F, Fut, T>(label: &str, operation: F) -> Result<T, NormalizedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OperationError>>,
{
    crate::retry::retry_with_default(label, operation).await
}

/// Retry with explicit options
pub async fn retry_with<F, Fut, T>(
    label: &str,
    operation: F,
    options: RetryOptions,
) -> Result<T, NormalizedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OperationError>>,
{
    let RetryOptions { policy, cancel } = options;
    let executor = RetryExecutor::new(policy);
    match cancel {
        Some(cancel) => executor.execute_cancellable(label, &cancel, operation).await,
        None => executor.execute(label, operation).await,
    }
}

/// Retry only when options are provided.
///
/// Without options the operation runs once; its error is still normalized so
/// call sites see the same error type either way.
pub async fn maybe_retry<F, Fut, T>(
    options: Option<RetryOptions>,
    label: &str,
    mut operation: F,
) -> Result<T, NormalizedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OperationError>>,
{
    match options {
        Some(opts) => retry_with(label, operation, opts).await,
        None => operation().await.map_err(|e| {
            tracing::warn!(target: "statarch::retry", label, error = %e, "[{label}] Attempt 1 failed.");
            normalize(Some(&e))
        }),
    }
}

/// Run two retried operations concurrently.
///
/// Each side has its own attempt count. The first normalized error wins and the
/// other side's retry loop is dropped.
pub async fn retry_pair<FA, FutA, A, FB, FutB, B>(
    options: &RetryOptions,
    (label_a, operation_a): (&str, FA),
    (label_b, operation_b): (&str, FB),
) -> Result<(A, B), NormalizedError>
where
    FA: FnMut() -> FutA,
    FutA: Future<Output = Result<A, OperationError>>,
    FB: FnMut() -> FutB,
    FutB: Future<Output = Result<B, OperationError>>,
{
    futures::future::try_join(
        retry_with(label_a, operation_a, options.clone()),
        retry_with(label_b, operation_b, options.clone()),
    )
    .await
}

//! statarch
//!
//! Retry with exponential backoff for generative-AI requests, plus
//! normalization of the final failure into a message a student can read.
//!
//! Only rate-limit and quota failures are retried (3 retries, 100/200/400ms
//! apart by default). Overload and every other failure surface on first
//! occurrence. Callers never see raw backend errors, only a [`NormalizedError`].
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod retry;
pub mod retry_api;
pub mod telemetry;
pub mod utils;

pub use config::RetryConfig;
pub use error::{ErrorKind, NormalizedError, OperationError};
pub use retry::{RetryExecutor, RetryPolicy};
pub use retry_api::{RetryOptions, maybe_retry, retry, retry_pair, retry_with};
pub use utils::cancel::CancelHandle;

//! Error Handling Module
//!
//! - Core error types (`OperationError`, `NormalizedError`, `ErrorKind`)
//! - User-facing normalization of the last failure
//! - Configuration errors
//!
//! # Example
//!
//! ```rust,ignore
//! use statarch::error::{normalize, OperationError, ErrorKind};
//!
//! let err = normalize(Some(&OperationError::from_status(429)));
//! assert_eq!(err.kind(), ErrorKind::UsageLimit);
//! ```

pub mod helpers;
pub mod types;

pub use helpers::*;
pub use types::*;

/// Errors raised while loading configuration or installing the tracing subscriber
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to initialize tracing: {0}")]
    Tracing(String),
}

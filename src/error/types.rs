//! Core error types
//!
//! `OperationError` is what a wrapped operation fails with. `NormalizedError` is
//! the only error that ever leaves the retry executor.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failure reported by a wrapped operation.
///
/// Every field is optional: backends differ in what they report. A message may
/// itself embed a JSON response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Error)]
pub struct OperationError {
    /// HTTP-like status code, when the backend reported one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Free-form message (may contain a serialized JSON body)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Structured payload attached by the caller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl OperationError {
    /// Create an error carrying only a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Create an error carrying only a status code
    pub fn from_status(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Attach a status code
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach a structured payload
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Non-empty message, if any
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref().filter(|m| !m.is_empty())
    }

    /// Text used for classification: the message when non-empty, otherwise the
    /// JSON serialization of the whole error.
    pub fn raw_message(&self) -> String {
        match self.message() {
            Some(message) => message.to_string(),
            None => serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string()),
        }
    }

    /// Whether this failure looks like rate limiting or quota exhaustion.
    ///
    /// Only the explicit status and the message are consulted; an error without
    /// a message never matches on text.
    pub fn is_rate_limited(&self) -> bool {
        if self.status == Some(429) {
            return true;
        }
        self.message().is_some_and(mentions_usage_limit)
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, self.message()) {
            (Some(status), Some(message)) => write!(f, "status {status}: {message}"),
            (None, Some(message)) => f.write_str(message),
            _ => f.write_str(&self.raw_message()),
        }
    }
}

impl From<&str> for OperationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for OperationError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for OperationError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("Failed to parse response: {err}"))
    }
}

/// "429" is matched case-sensitively, the words case-insensitively.
pub(crate) fn mentions_usage_limit(text: &str) -> bool {
    if text.contains("429") {
        return true;
    }
    let lower = text.to_lowercase();
    lower.contains("quota") || lower.contains("resource exhausted")
}

/// Both markers are matched case-sensitively.
pub(crate) fn mentions_overload(text: &str) -> bool {
    text.contains("503") || text.contains("Overloaded")
}

/// Coarse category of a normalized error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rate limit or quota exhausted
    UsageLimit,
    /// Backend temporarily overloaded
    Overloaded,
    /// The caller cancelled the request
    Cancelled,
    /// Anything else
    Other,
}

/// User-presentable error returned once retries are over.
///
/// `Display` renders only the message, so it can be shown as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct NormalizedError {
    kind: ErrorKind,
    message: String,
}

impl NormalizedError {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            super::helpers::UNEXPECTED_MESSAGE.to_string()
        } else {
            message
        };
        Self { kind, message }
    }

    pub(crate) fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, super::helpers::CANCELLED_MESSAGE)
    }

    /// The user-readable message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Category derived from the same rules as the message
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// True for rate-limit and overload failures, which usually clear up on their own
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind, ErrorKind::UsageLimit | ErrorKind::Overloaded)
    }
}

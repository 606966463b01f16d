//! User-facing error normalization.
//!
//! Turns the last failure of a retried operation into a single flat message.
//! Rate-limit detection runs before JSON unwrapping so a quota response body
//! never replaces the actionable usage-limit message.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::types::{ErrorKind, NormalizedError, OperationError, mentions_overload, mentions_usage_limit};

pub const USAGE_LIMIT_MESSAGE: &str = "Usage limit exceeded. Please wait a minute and try again.";
pub const OVERLOADED_MESSAGE: &str = "Service overloaded. Please try again shortly.";
pub const UNEXPECTED_MESSAGE: &str = "An unexpected error occurred.";
pub const CANCELLED_MESSAGE: &str = "Request cancelled.";

// Greedy and single-line: first `{` to the last `}` on the same line.
static EMBEDDED_JSON: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\{.*\}").ok());

/// Normalize the last recorded failure into a user-presentable error.
pub fn normalize(last_error: Option<&OperationError>) -> NormalizedError {
    let Some(error) = last_error else {
        return NormalizedError::new(ErrorKind::Other, UNEXPECTED_MESSAGE);
    };
    let (kind, message) = classify_message(&error.raw_message());
    NormalizedError::new(kind, message)
}

/// Classify a raw message into a category and the text to show the user.
pub fn classify_message(raw_message: &str) -> (ErrorKind, String) {
    if mentions_usage_limit(raw_message) {
        return (ErrorKind::UsageLimit, USAGE_LIMIT_MESSAGE.to_string());
    }
    if mentions_overload(raw_message) {
        return (ErrorKind::Overloaded, OVERLOADED_MESSAGE.to_string());
    }
    let message = extract_embedded_message(raw_message).unwrap_or_else(|| raw_message.to_string());
    (ErrorKind::Other, message)
}

/// Pull `error.message` (or top-level `message`) out of a JSON object embedded
/// in `text`. Returns `None` when there is no object, it does not parse, or it
/// carries neither field as a non-empty string.
pub fn extract_embedded_message(text: &str) -> Option<String> {
    let candidate = EMBEDDED_JSON.as_ref()?.find(text)?;
    let parsed: Value = serde_json::from_str(candidate.as_str()).ok()?;

    let non_empty = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    non_empty(parsed.get("error").and_then(|e| e.get("message")))
        .or_else(|| non_empty(parsed.get("message")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn normalized(message: &str) -> NormalizedError {
        normalize(Some(&OperationError::new(message)))
    }

    #[test]
    fn missing_error_is_unexpected() {
        let err = normalize(None);
        assert_eq!(err.message(), UNEXPECTED_MESSAGE);
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[test]
    fn quota_beats_json_unwrapping() {
        let err = normalized(r#"{"error": {"code": 429, "message": "You exceeded your current quota"}}"#);
        assert_eq!(err.message(), USAGE_LIMIT_MESSAGE);
        assert_eq!(err.kind(), ErrorKind::UsageLimit);
    }

    #[test]
    fn status_only_error_uses_serialized_form() {
        let err = normalize(Some(&OperationError::from_status(429)));
        assert_eq!(err.message(), USAGE_LIMIT_MESSAGE);

        let err = normalize(Some(&OperationError::from_status(503)));
        assert_eq!(err.message(), OVERLOADED_MESSAGE);
    }

    #[test]
    fn overload_markers() {
        assert_eq!(normalized("HTTP 503 from upstream").message(), OVERLOADED_MESSAGE);
        assert_eq!(normalized("Overloaded").kind(), ErrorKind::Overloaded);
        // lowercase "overloaded" is not an overload marker
        assert_eq!(
            normalized("model overloaded, try later").message(),
            "model overloaded, try later"
        );
    }

    #[test]
    fn unwraps_nested_error_message() {
        let err = normalized(r#"{"error": {"message": "Model overloaded, try smaller input"}}"#);
        assert_eq!(err.message(), "Model overloaded, try smaller input");
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[test]
    fn unwraps_top_level_message_with_prefix() {
        let err = normalized(r#"generateContent failed: {"message": "Invalid model name"} (see logs)"#);
        assert_eq!(err.message(), "Invalid model name");
    }

    #[test]
    fn json_without_known_fields_falls_back_to_raw() {
        let raw = r#"{"error": {"code": 400}}"#;
        assert_eq!(normalized(raw).message(), raw);
    }

    #[test]
    fn malformed_json_falls_back_to_raw() {
        let raw = "Request failed: {not: valid json}";
        assert_eq!(normalized(raw).message(), raw);
    }

    #[test]
    fn plain_message_passes_through() {
        let raw = "Invalid argument: field 'x' missing";
        assert_eq!(normalized(raw).message(), raw);
    }

    #[test]
    fn brace_match_stays_on_one_line() {
        let raw = "{\"message\": \"first\"}\n{\"message\": \"second\"}";
        assert_eq!(normalized(raw).message(), "first");
    }

    proptest! {
        #[test]
        fn any_quota_mention_is_usage_limit(prefix in "[a-z ]{0,20}", suffix in "[a-z ]{0,20}") {
            let err = normalized(&format!("{prefix}QuOtA{suffix}"));
            prop_assert_eq!(err.message(), USAGE_LIMIT_MESSAGE);
        }

        #[test]
        fn normalized_message_is_never_empty(raw in ".*") {
            let err = normalized(&raw);
            prop_assert!(!err.message().trim().is_empty());
        }
    }
}

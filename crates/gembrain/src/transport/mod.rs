//! Transport layer for the generation service.
//!
//! This module defines the [`Transport`] contract shared by the two network
//! paths, the failure taxonomy that drives the fallback policy, and the
//! parsing helpers that normalize every response into [`Part`]s at this
//! boundary.
//!
//! - [`direct`] -- API-key authenticated transport calling the service
//!   directly.
//! - [`relay`] -- credential-based transport through an intermediary
//!   endpoint with one-time project discovery.

pub mod direct;
pub mod relay;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use crate::conversation::{Conversation, Part};
use crate::skills::ToolDeclaration;

pub use direct::DirectTransport;
pub use relay::RelayTransport;

// ---------------------------------------------------------------------------
// Failure taxonomy
// ---------------------------------------------------------------------------

/// Classification of a failed send, driving the recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendErrorKind {
    /// Rate/quota rejection.  Short cooldown, immediate fallback.
    QuotaExceeded,
    /// The service rejected the model identifier outright.  Long cooldown,
    /// immediate fallback.
    ModelRejected,
    /// Connection or name-resolution failure.  Retry the same model.
    TransientNetwork,
    /// Anything else.  Retry the same model after a short backoff.
    Unknown,
}

/// A failed transport send.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct SendError {
    /// Failure classification.
    pub kind: SendErrorKind,
    /// Human-readable reason.
    pub message: String,
    /// Provider-suggested retry delay, when one could be parsed from the
    /// error payload.
    pub retry_after: Option<Duration>,
}

impl SendError {
    /// Create an error without a suggested retry delay.
    pub fn new(kind: SendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Transport contract
// ---------------------------------------------------------------------------

/// Abstract send operation to the remote generation service.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one generation request for `model` and return the normalized
    /// response parts.
    async fn send(
        &self,
        model: &str,
        conversation: &Conversation,
        system_instruction: Option<&str>,
        tools: &[ToolDeclaration],
    ) -> std::result::Result<Vec<Part>, SendError>;
}

// ---------------------------------------------------------------------------
// Shared classification and parsing
// ---------------------------------------------------------------------------

/// Classify a non-success HTTP response from the generation service.
pub(crate) fn classify_response(status: StatusCode, body: &str) -> SendError {
    if status == StatusCode::TOO_MANY_REQUESTS || is_quota_error(body) {
        return SendError {
            kind: SendErrorKind::QuotaExceeded,
            message: format!("quota rejection ({status}): {}", excerpt(body)),
            retry_after: parse_retry_delay(body),
        };
    }
    if is_model_rejection(status, body) {
        return SendError::new(
            SendErrorKind::ModelRejected,
            format!("model rejected ({status}): {}", excerpt(body)),
        );
    }
    SendError::new(
        SendErrorKind::Unknown,
        format!("service returned {status}: {}", excerpt(body)),
    )
}

/// Classify a reqwest-level failure (the request never produced a response).
pub(crate) fn classify_request_error(err: &reqwest::Error) -> SendError {
    if err.is_connect() || err.is_timeout() {
        SendError::new(
            SendErrorKind::TransientNetwork,
            format!("network failure: {err}"),
        )
    } else {
        SendError::new(SendErrorKind::Unknown, format!("request failed: {err}"))
    }
}

fn is_quota_error(body: &str) -> bool {
    body.contains("RESOURCE_EXHAUSTED")
        || body.contains("rate limit")
        || body.contains("quota")
        || body.contains("Quota")
}

fn is_model_rejection(status: StatusCode, body: &str) -> bool {
    status == StatusCode::NOT_FOUND
        || (status == StatusCode::BAD_REQUEST
            && body.contains("model")
            && (body.contains("not found") || body.contains("not supported")))
}

/// Extract a provider-suggested retry delay from an error payload.
///
/// Quota rejections may carry a `retryDelay` field (e.g. `"21s"` or
/// `"21.5s"`) inside the error details.  Returns `None` when absent or
/// unparseable so the caller falls back to the configured default.
pub(crate) fn parse_retry_delay(body: &str) -> Option<Duration> {
    let idx = body.find("retryDelay")?;
    let rest = &body[idx..];
    let digits: String = rest
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let secs: f64 = digits.parse().ok()?;
    if secs > 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

/// Normalize a success payload into [`Part`]s.
///
/// Expects the direct-response shape: `candidates[0].content.parts[]`.
/// Unknown part kinds are skipped.
pub(crate) fn parse_candidate_parts(value: &Value) -> std::result::Result<Vec<Part>, SendError> {
    let parts = value
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            SendError::new(
                SendErrorKind::Unknown,
                "malformed response: missing candidates[0].content.parts",
            )
        })?;
    Ok(parts.iter().filter_map(Part::from_wire).collect())
}

/// Wire shape of the tool declarations (`tools` request field).
pub(crate) fn tools_to_wire(tools: &[ToolDeclaration]) -> Value {
    serde_json::json!([{
        "functionDeclarations": tools
            .iter()
            .map(|t| serde_json::json!({
                "name": t.name,
                "description": t.description,
                "parameters": t.parameters,
            }))
            .collect::<Vec<_>>(),
    }])
}

/// Wire shape of the system instruction.
pub(crate) fn system_instruction_to_wire(text: &str) -> Value {
    serde_json::json!({ "parts": [{ "text": text }] })
}

fn excerpt(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(300)
        .map_or(body.len(), |(idx, _)| idx);
    &body[..end]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_429_is_quota() {
        let err = classify_response(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert_eq!(err.kind, SendErrorKind::QuotaExceeded);
    }

    #[test]
    fn resource_exhausted_body_is_quota() {
        let err = classify_response(
            StatusCode::FORBIDDEN,
            r#"{"error": {"status": "RESOURCE_EXHAUSTED"}}"#,
        );
        assert_eq!(err.kind, SendErrorKind::QuotaExceeded);
    }

    #[test]
    fn quota_error_prefers_provider_retry_delay() {
        let body = r#"{"error": {"status": "RESOURCE_EXHAUSTED", "details": [{"retryDelay": "21s"}]}}"#;
        let err = classify_response(StatusCode::TOO_MANY_REQUESTS, body);
        assert_eq!(err.retry_after, Some(Duration::from_secs(21)));
    }

    #[test]
    fn fractional_retry_delay_parses() {
        assert_eq!(
            parse_retry_delay(r#""retryDelay": "2.5s""#),
            Some(Duration::from_millis(2500))
        );
    }

    #[test]
    fn missing_or_garbled_retry_delay_is_none() {
        assert_eq!(parse_retry_delay("no delay here"), None);
        assert_eq!(parse_retry_delay(r#""retryDelay": "soon""#), None);
    }

    #[test]
    fn unknown_model_is_rejected() {
        let err = classify_response(StatusCode::NOT_FOUND, "no such thing");
        assert_eq!(err.kind, SendErrorKind::ModelRejected);

        let err = classify_response(
            StatusCode::BAD_REQUEST,
            "model gemini-nope is not found for API version v1beta",
        );
        assert_eq!(err.kind, SendErrorKind::ModelRejected);
    }

    #[test]
    fn other_failures_are_unknown() {
        let err = classify_response(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert_eq!(err.kind, SendErrorKind::Unknown);
    }

    #[test]
    fn candidate_parts_are_normalized() {
        let payload = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "hello "},
                        {"functionCall": {"name": "echo", "args": {"x": 1}}},
                        {"unmodeledKind": {}},
                    ],
                },
            }],
        });
        let parts = parse_candidate_parts(&payload).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], Part::text("hello "));
        assert!(parts[1].is_function_call());
    }

    #[test]
    fn malformed_payload_is_unknown_failure() {
        let err = parse_candidate_parts(&json!({"candidates": []})).unwrap_err();
        assert_eq!(err.kind, SendErrorKind::Unknown);
    }

    #[test]
    fn tool_declarations_wire_shape() {
        let tools = vec![ToolDeclaration {
            name: "echo".into(),
            description: "Echo.".into(),
            parameters: json!({"type": "OBJECT", "properties": {}, "required": []}),
        }];
        let wire = tools_to_wire(&tools);
        assert_eq!(wire[0]["functionDeclarations"][0]["name"], "echo");
    }
}

//! Provider error kinds and retry classification.
//!
//! The provider layer never panics: every failure becomes a terminal
//! `Error` event carrying a [`ProviderError`]. The agent loop persists the
//! classification on the assistant message as an [`AssistantError`] so the
//! host can decide whether to retry.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Classification of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Cancelled by the caller. Not retryable.
    Aborted,
    /// No adapter registered for the requested API. Fatal.
    NoProvider,
    /// Non-2xx response other than the specific cases below. Not retryable
    /// by default.
    Api,
    /// Transport failure. Retryable at the host's discretion.
    Network,
    /// Malformed provider payload. Not retryable (a retry would loop).
    Decoding,
    /// Request timed out. Retryable.
    Timeout,
    /// HTTP 429. Retryable, honouring `retry_after` when supplied.
    RateLimited,
    /// HTTP 529. Retryable.
    Overloaded,
    /// HTTP status >= 500. Retryable.
    Server,
}

impl ErrorKind {
    /// Whether the host may usefully retry after this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::RateLimited | Self::Overloaded | Self::Server
        )
    }
}

/// A provider failure: the classification plus human-readable detail.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    /// Failure classification.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Server-suggested retry delay (from `Retry-After` or the error body).
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    /// Create an error with no status or retry hint.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retry_after: None,
        }
    }

    /// A cancellation error.
    pub fn aborted() -> Self {
        Self::new(ErrorKind::Aborted, "request aborted")
    }

    /// Map an HTTP status plus response body to an error.
    ///
    /// 429 maps to [`ErrorKind::RateLimited`], 529 to
    /// [`ErrorKind::Overloaded`], any other status >= 500 to
    /// [`ErrorKind::Server`]; everything else becomes [`ErrorKind::Api`]
    /// with a message extracted from the provider error body when one is
    /// present.
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let kind = match status {
            429 => ErrorKind::RateLimited,
            529 => ErrorKind::Overloaded,
            s if s >= 500 => ErrorKind::Server,
            _ => ErrorKind::Api,
        };
        let message = extract_provider_message(body)
            .unwrap_or_else(|| format!("unexpected status {status}"));
        Self {
            kind,
            message,
            status: Some(status),
            retry_after,
        }
    }

    /// Whether the host may usefully retry after this failure.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Try to pull a human-readable message out of a provider error body.
///
/// Both Anthropic (`{"error":{"message":…}}`) and OpenAI-compatible bodies
/// use a nested `error.message`; some gateways use a flat `message`.
fn extract_provider_message(body: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    v["error"]["message"]
        .as_str()
        .or_else(|| v["message"].as_str())
        .map(str::to_owned)
}

/// Error details persisted on an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantError {
    /// Failure classification.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
}

impl From<&ProviderError> for AssistantError {
    fn from(err: &ProviderError) -> Self {
        Self {
            kind: err.kind,
            message: err.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ProviderError::from_status(429, "", None).kind,
            ErrorKind::RateLimited
        );
        assert_eq!(
            ProviderError::from_status(529, "", None).kind,
            ErrorKind::Overloaded
        );
        assert_eq!(
            ProviderError::from_status(500, "", None).kind,
            ErrorKind::Server
        );
        assert_eq!(
            ProviderError::from_status(503, "", None).kind,
            ErrorKind::Server
        );
        assert_eq!(
            ProviderError::from_status(400, "", None).kind,
            ErrorKind::Api
        );
        assert_eq!(
            ProviderError::from_status(404, "", None).kind,
            ErrorKind::Api
        );
    }

    #[test]
    fn retryability() {
        for kind in [
            ErrorKind::Network,
            ErrorKind::Timeout,
            ErrorKind::RateLimited,
            ErrorKind::Overloaded,
            ErrorKind::Server,
        ] {
            assert!(kind.is_retryable(), "{kind:?} should be retryable");
        }
        for kind in [
            ErrorKind::Aborted,
            ErrorKind::NoProvider,
            ErrorKind::Api,
            ErrorKind::Decoding,
        ] {
            assert!(!kind.is_retryable(), "{kind:?} should not be retryable");
        }
    }

    #[test]
    fn message_extracted_from_error_body() {
        let err = ProviderError::from_status(
            400,
            r#"{"error":{"type":"invalid_request_error","message":"max_tokens required"}}"#,
            None,
        );
        assert_eq!(err.message, "max_tokens required");
        assert_eq!(err.status, Some(400));
    }

    #[test]
    fn fallback_message_for_opaque_body() {
        let err = ProviderError::from_status(418, "not json", None);
        assert_eq!(err.message, "unexpected status 418");
    }
}

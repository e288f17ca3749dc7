//! Inference error types and failure classification.

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::types::Summary;

/// Result type for inference operations.
pub type InferenceResult<T = Summary> = Result<T, InferenceError>;

/// What went wrong on a single endpoint call.
///
/// Only [`FailureKind::RateLimited`] is eligible for automatic retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The endpoint explicitly signalled rate limiting or quota exhaustion
    RateLimited,
    /// Credential rejected
    Unauthorized,
    /// Malformed or unacceptable request
    InvalidRequest,
    /// Endpoint-side failure (5xx)
    Server,
    /// Connection, TLS or timeout failure before a response arrived
    Transport,
    /// A streamed response ended before its end-of-response marker
    IncompleteResponse,
    /// The response body could not be understood
    MalformedResponse,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::Server => "server",
            FailureKind::Transport => "transport",
            FailureKind::IncompleteResponse => "incomplete_response",
            FailureKind::MalformedResponse => "malformed_response",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::RateLimited)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure returned by a model endpoint.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct EndpointError {
    pub kind: FailureKind,
    pub message: String,
    /// HTTP status, when the failure came with one
    pub status: Option<u16>,
    /// Server-suggested wait, when the endpoint sent one
    pub retry_after: Option<Duration>,
}

impl EndpointError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retry_after: None,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimited, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, message)
    }

    pub fn incomplete(message: impl Into<String>) -> Self {
        Self::new(FailureKind::IncompleteResponse, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedResponse, message)
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == FailureKind::RateLimited
    }

    /// Classify a non-success HTTP response.
    ///
    /// Structured error bodies are inspected for a machine-readable
    /// rate-limit indicator (`rate_limit_exceeded` codes and
    /// `RESOURCE_EXHAUSTED` statuses) in addition to the status code.
    pub fn from_http_status(status: u16, body: &str) -> Self {
        let detail = ErrorDetail::parse(body);

        let kind = if status == 429 || detail.signals_rate_limit() {
            FailureKind::RateLimited
        } else {
            match status {
                401 | 403 => FailureKind::Unauthorized,
                500..=599 => FailureKind::Server,
                _ => FailureKind::InvalidRequest,
            }
        };

        let message = detail
            .message
            .unwrap_or_else(|| truncate(body.trim(), 512));

        Self {
            kind,
            message: format!("HTTP {}: {}", status, message),
            status: Some(status),
            retry_after: None,
        }
    }

    /// Classify an error object delivered inside an otherwise successful
    /// (streamed) response.
    pub fn from_error_payload(payload: &str) -> Self {
        let detail = ErrorDetail::parse(payload);
        let kind = if detail.signals_rate_limit() {
            FailureKind::RateLimited
        } else {
            FailureKind::Server
        };
        let message = detail
            .message
            .unwrap_or_else(|| truncate(payload.trim(), 512));
        Self::new(kind, message)
    }

    /// Classify a client-side HTTP error.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_decode() {
            Self::malformed(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_http_status(status.as_u16(), &err.to_string())
        } else {
            Self::transport(err.to_string())
        }
    }
}

/// Errors surfaced by the inference client.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Inference endpoint failed: {0}")]
    Endpoint(#[from] EndpointError),

    #[error("max retry attempts reached after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: EndpointError },

    #[error("Inference cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No frames to summarize")]
    NoFrames,
}

impl InferenceError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Failure kind of the underlying endpoint error, if any.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            InferenceError::Endpoint(e) => Some(e.kind),
            InferenceError::RetriesExhausted { last, .. } => Some(last.kind),
            _ => None,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, InferenceError::Config(_))
    }
}

/// Fields of interest from OpenAI-style and Google-style error bodies.
#[derive(Debug, Default)]
struct ErrorDetail {
    message: Option<String>,
    code: Option<String>,
    error_type: Option<String>,
    status: Option<String>,
}

impl ErrorDetail {
    fn parse(body: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(body) else {
            return Self::default();
        };
        let error = value.get("error").unwrap_or(&value);

        let text = |key: &str| match error.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        Self {
            message: text("message"),
            code: text("code"),
            error_type: text("type"),
            status: text("status"),
        }
    }

    fn signals_rate_limit(&self) -> bool {
        let is_rate_code = |v: &Option<String>| {
            v.as_deref()
                .is_some_and(|s| s == "rate_limit_exceeded" || s == "429")
        };

        is_rate_code(&self.code)
            || is_rate_code(&self.error_type)
            || self.status.as_deref() == Some("RESOURCE_EXHAUSTED")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

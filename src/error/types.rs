//! Core error types
//!
//! `LlmError` is the single error type returned across the crate. Every variant
//! maps onto one of four caller-facing kinds (`ErrorKind`), and the Router is the
//! only place where an `LlmError` is turned into an `ErrorEnvelope`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// Message returned to callers in place of internal error detail.
pub const GENERIC_INTERNAL_MESSAGE: &str = "Internal server error";

/// Coarse error classification surfaced to the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing access key (HTTP 401)
    Authentication,
    /// Bad model/provider/payload shape (HTTP 400)
    Validation,
    /// Upstream non-200, unreachable upstream or malformed upstream payload
    Provider,
    /// Unexpected failure inside the gateway
    Internal,
}

impl ErrorKind {
    /// HTTP status used when no more specific code is known.
    pub const fn default_status(self) -> u16 {
        match self {
            ErrorKind::Authentication => 401,
            ErrorKind::Validation => 400,
            ErrorKind::Provider => 500,
            ErrorKind::Internal => 500,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Authentication => "authentication_error",
            ErrorKind::Validation => "validation_error",
            ErrorKind::Provider => "provider_error",
            ErrorKind::Internal => "internal_error",
        }
    }
}

/// Gateway error type.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// The caller's access key is missing or not in the membership set.
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Unknown provider/model, wrong entry point, or malformed payload.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The upstream answered with an error status or an unusable payload.
    #[error("Provider error ({provider}, HTTP {status}): {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
        /// Raw upstream body, kept for diagnostics.
        body: Option<String>,
    },

    /// Transport-level failure talking to the upstream.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Connect/read/total timeout on the outbound call.
    #[error("Timeout error: {0}")]
    TimeoutError(String),

    /// Failure while reading a streaming body.
    #[error("Stream error: {0}")]
    StreamError(String),

    /// Upstream data could not be interpreted.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    JsonError(String),

    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Anything unexpected.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl LlmError {
    /// Build a provider error from an upstream status and raw body.
    pub fn upstream(provider: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self::ProviderError {
            provider: provider.into(),
            status,
            message: format!("API error: {status}"),
            body: Some(body),
        }
    }

    /// Classify this error into one of the caller-facing kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::AuthenticationError(_) => ErrorKind::Authentication,
            LlmError::ValidationError(_) => ErrorKind::Validation,
            LlmError::ProviderError { .. }
            | LlmError::HttpError(_)
            | LlmError::TimeoutError(_)
            | LlmError::StreamError(_)
            | LlmError::ParseError(_) => ErrorKind::Provider,
            LlmError::JsonError(_)
            | LlmError::ConfigurationError(_)
            | LlmError::InternalError(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status for this error. Upstream codes are echoed when known.
    pub fn status_code(&self) -> u16 {
        match self {
            LlmError::ProviderError { status, .. } if *status != 0 => *status,
            LlmError::TimeoutError(_) => 504,
            other => other.kind().default_status(),
        }
    }

    /// Stable type tag, used as the `type` field of error-shaped mappings.
    pub fn type_name(&self) -> &'static str {
        match self {
            LlmError::AuthenticationError(_) => "AuthenticationError",
            LlmError::ValidationError(_) => "ValidationError",
            LlmError::ProviderError { .. } => "ProviderError",
            LlmError::HttpError(_) => "HttpError",
            LlmError::TimeoutError(_) => "TimeoutError",
            LlmError::StreamError(_) => "StreamError",
            LlmError::ParseError(_) => "ParseError",
            LlmError::JsonError(_) => "JsonError",
            LlmError::ConfigurationError(_) => "ConfigurationError",
            LlmError::InternalError(_) => "InternalError",
        }
    }

    /// Raw upstream response body, if this error carries one.
    pub fn upstream_body(&self) -> Option<&str> {
        match self {
            LlmError::ProviderError { body, .. } => body.as_deref(),
            _ => None,
        }
    }

    /// Message safe to show to callers.
    ///
    /// Internal failures collapse to a generic text; their detail only goes to logs.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => GENERIC_INTERNAL_MESSAGE.to_string(),
            _ => match self {
                LlmError::AuthenticationError(m) | LlmError::ValidationError(m) => m.clone(),
                LlmError::ProviderError { message, .. } => message.clone(),
                other => other.to_string(),
            },
        }
    }

    /// Convert into the caller-facing envelope.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        let envelope = ErrorEnvelope::new(self.kind(), self.status_code(), self.user_message());
        match self {
            LlmError::ProviderError {
                provider,
                status,
                body,
                ..
            } => envelope.with_details(json!({
                "provider": provider,
                "status": status,
                "body": body.as_deref().map(decode_body),
            })),
            _ => envelope,
        }
    }
}

/// Decode an upstream body as JSON when possible, otherwise keep it as text.
pub(crate) fn decode_body(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Structured failure handed to the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub kind: ErrorKind,
    /// HTTP status code
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorEnvelope {
    pub fn new(kind: ErrorKind, code: u16, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Wire shape: `{"error": {"message", "type", "code", "details"?}}`.
    pub fn to_json(&self) -> Value {
        let mut error = json!({
            "message": self.message,
            "type": self.kind.as_str(),
            "code": self.code,
        });
        if let Some(details) = &self.details {
            error["details"] = details.clone();
        }
        json!({ "error": error })
    }
}

impl From<&LlmError> for ErrorEnvelope {
    fn from(err: &LlmError) -> Self {
        err.to_envelope()
    }
}

//! Server adapters: expose the router over HTTP
//!
//! The framework-agnostic helpers here turn router results into a status code
//! plus JSON body. The [`axum`] module wires them into an OpenAI-compatible
//! HTTP surface:
//!
//! - `POST /v1/chat/completions` (unary or `text/event-stream`)
//! - `GET /v1/models`
//! - `GET /v1/stats`
//!
//! ## Example (Axum)
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use llm_bridge::{config::GatewayConfig, router::Router, server_adapters::axum::app};
//!
//! let gateway = Arc::new(Router::from_config(GatewayConfig::load("config.yaml")?)?);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, app(gateway)).await?;
//! ```

use serde_json::Value;

use crate::error::{ErrorKind, LlmError};

pub mod axum;

/// Extract the caller key from an `Authorization` header value.
///
/// A missing header yields an empty key, which never validates.
pub fn bearer_token(header: Option<&str>) -> &str {
    let Some(value) = header else {
        return "";
    };
    let value = value.trim();
    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        _ => value,
    }
}

/// Status code and JSON body for a router failure.
///
/// Internal failures are logged here with full detail; the caller only sees
/// the generic message.
pub fn error_parts(error: &LlmError) -> (u16, Value) {
    if error.kind() == ErrorKind::Internal {
        tracing::error!(error = %error, "request failed with internal error");
    }
    let envelope = error.to_envelope();
    (envelope.code, envelope.to_json())
}

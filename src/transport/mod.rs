//! Outbound HTTP transport
//!
//! The router never touches `reqwest` directly; it hands a fully prepared
//! request to an [`HttpTransport`]. Tests swap in a fake transport to observe
//! (or forbid) outbound calls without a network.

mod client;

pub use client::ReqwestTransport;

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::header::HeaderMap;

use crate::error::LlmError;
use crate::streaming::ByteStream;

/// A JSON POST to an upstream provider.
#[derive(Debug, Clone)]
pub struct HttpTransportRequest {
    /// Provider name, for logs only
    pub provider: String,
    pub url: String,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
    /// Total budget for this call
    pub timeout: Duration,
    pub proxy: Option<String>,
}

/// Upstream response with a lazily read body.
pub struct HttpTransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl std::fmt::Debug for HttpTransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl HttpTransportResponse {
    /// Response with an in-memory body.
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            headers: HeaderMap::new(),
            body: Box::pin(futures::stream::once(async move { Ok(body) })),
        }
    }

    /// Read the whole body.
    pub async fn bytes(mut self) -> Result<Bytes, LlmError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Read the whole body as text, replacing invalid UTF-8.
    pub async fn text(self) -> Result<String, LlmError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Outbound HTTP transport.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue one POST. Non-2xx statuses are returned, not raised.
    async fn send(&self, request: HttpTransportRequest) -> Result<HttpTransportResponse, LlmError>;

    /// Release pooled connections. The transport stays usable afterwards.
    async fn close(&self) {}
}

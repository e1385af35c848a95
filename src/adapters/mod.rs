//! Provider Adapter System
//!
//! One adapter per upstream wire dialect. An adapter translates the canonical
//! request into the dialect's payload, normalizes the dialect's responses and
//! stream frames back into canonical form, and shapes upstream failures into an
//! error mapping. Adapters never classify errors; the router does.
//!
//! New dialects are added by registering a constructor with
//! [`AdapterFactory`](crate::registry::AdapterFactory).

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};

use crate::config::ModelConfig;
use crate::error::LlmError;
use crate::streaming::{ByteStream, ChunkStream, DONE_CHUNK, SseFrame, data_chunk, reframe};
use crate::types::{ChatRequest, ChatResponse};

pub mod params;

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "gemini")]
pub use gemini::GeminiAdapter;
#[cfg(feature = "openai")]
pub use openai::OpenAiAdapter;
pub use params::apply_param_config;

/// Chunk emitted when the upstream closed in the middle of an event.
pub const INCOMPLETE_WARNING: &str = "incomplete data";

/// Core provider adapter trait
pub trait ProviderAdapter: Send + Sync + std::fmt::Debug {
    /// Dialect tag this adapter was registered under.
    fn adapter_type(&self) -> &'static str;

    /// Build the provider-native payload for `model`.
    ///
    /// Base field mapping first, then the model's parameter rewrites.
    fn prepare_request(
        &self,
        request: &ChatRequest,
        model: &str,
        model_config: &ModelConfig,
    ) -> Result<Value, LlmError>;

    /// Normalize a decoded unary response.
    fn process_response(&self, raw: Value) -> Result<ChatResponse, LlmError>;

    /// Rewrite an upstream SSE body into canonical chunks.
    fn process_stream(&self, body: ByteStream) -> ChunkStream;

    /// URL the payload is POSTed to. Defaults to the configured base URL.
    fn endpoint(&self, base_url: &str, _model: &str, _stream: bool) -> String {
        base_url.to_string()
    }

    /// Error-shaped mapping for `error`, merging any upstream error body.
    fn handle_error(&self, error: &LlmError, status_code: u16) -> Value {
        error_body(error, status_code, false)
    }

    /// Outbound headers.
    fn get_headers(&self, api_key: &SecretString) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            secret_header(&format!("Bearer {}", api_key.expose_secret()))?,
        );
        Ok(headers)
    }
}

/// Response id for upstreams that do not supply one.
pub(crate) fn synthesized_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

/// Header value marked sensitive so it never shows up in debug output.
pub(crate) fn secret_header(value: &str) -> Result<HeaderValue, LlmError> {
    let mut header = HeaderValue::from_str(value).map_err(|_| {
        LlmError::ConfigurationError("API key contains characters not allowed in headers".into())
    })?;
    header.set_sensitive(true);
    Ok(header)
}

/// Build `{"error": {message, type, code, ...}}`.
///
/// When the error carries an upstream body it is decoded: a nested `error`
/// object is merged in, a top-level `message` is used when
/// `top_level_message` is set, anything else becomes the message verbatim.
/// Never fails.
pub fn error_body(error: &LlmError, status_code: u16, top_level_message: bool) -> Value {
    let mut fields = Map::new();
    fields.insert("message".into(), Value::String(error.user_message()));
    fields.insert("type".into(), Value::String(error.type_name().into()));
    fields.insert("code".into(), json!(status_code));

    if let Some(text) = error.upstream_body() {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(decoded)) => match decoded.get("error") {
                Some(Value::Object(nested)) => {
                    for (key, value) in nested {
                        fields.insert(key.clone(), value.clone());
                    }
                }
                Some(Value::String(message)) => {
                    fields.insert("message".into(), Value::String(message.clone()));
                }
                _ => match decoded.get("message") {
                    Some(message) if top_level_message => {
                        fields.insert("message".into(), message.clone());
                    }
                    _ => {
                        fields.insert("message".into(), Value::String(text.to_string()));
                    }
                },
            },
            _ => {
                fields.insert("message".into(), Value::String(text.to_string()));
            }
        }
    }

    json!({ "error": Value::Object(fields) })
}

/// Drive an upstream SSE body through `map_event`, emitting canonical chunks.
///
/// `map_event` receives each decoded JSON payload and returns the canonical
/// chunk to emit, or `None` to drop it. `[DONE]` ends the sequence.
pub(crate) fn sse_chunk_stream<F>(adapter: &'static str, body: ByteStream, mut map_event: F) -> ChunkStream
where
    F: FnMut(Value) -> Option<Value> + Send + 'static,
{
    use futures::StreamExt;

    Box::pin(async_stream::stream! {
        let mut frames = reframe(body);
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(SseFrame::Event(event)) => match serde_json::from_str::<Value>(&event.data) {
                    Ok(payload) => {
                        if let Some(chunk) = map_event(payload) {
                            yield Ok(data_chunk(&chunk));
                        }
                    }
                    Err(e) => {
                        tracing::warn!(adapter, error = %e, data = %event.data, "skipping malformed stream frame");
                    }
                },
                Ok(SseFrame::Comment(text)) => {
                    tracing::debug!(adapter, comment = %text, "upstream heartbeat");
                }
                Ok(SseFrame::Done) => {
                    yield Ok(DONE_CHUNK.to_string());
                    return;
                }
                Ok(SseFrame::Incomplete(residual)) => {
                    tracing::warn!(adapter, residual = %residual, "upstream closed mid-event; incomplete data discarded");
                    yield Ok(data_chunk(&json!({ "warning": INCOMPLETE_WARNING })));
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
    })
}

//! Streaming primitives
//!
//! Upstream bodies arrive as [`ByteStream`]s; [`sse::reframe`] turns them into
//! logical SSE frames which adapters then rewrite into canonical chunks.

pub mod sse;

pub use sse::{SseEvent, SseFrame, SseParser, reframe};

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;

use crate::error::LlmError;

/// Raw upstream body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

/// Parsed SSE frames.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<SseFrame, LlmError>> + Send>>;

/// Canonical SSE text chunks (`data: ...\n\n`) handed back to the caller.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Terminal frame of every canonical stream.
pub const DONE_CHUNK: &str = "data: [DONE]\n\n";

/// Wrap a JSON payload as one SSE `data:` frame.
pub fn data_chunk(payload: &serde_json::Value) -> String {
    format!("data: {payload}\n\n")
}

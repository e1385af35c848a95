//! SSE reframing
//!
//! Byte-boundary agnostic: lines are split on raw bytes before decoding, so a
//! multi-byte character split across two network chunks still decodes intact.
//! Invalid UTF-8 is replaced, never rejected.

use std::time::Duration;

use bytes::{Buf, BytesMut};
use futures::StreamExt;

use super::{ByteStream, FrameStream};

const DONE_PAYLOAD: &str = "[DONE]";

/// One complete server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    /// Data lines joined with `\n`
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<Duration>,
}

/// Output of the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Event(SseEvent),
    /// `:` line (heartbeat), text after the colon
    Comment(String),
    /// Event whose payload is exactly `[DONE]`
    Done,
    /// Unterminated data left over at end of input
    Incomplete(String),
}

#[derive(Debug, Default)]
struct PendingEvent {
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    retry: Option<Duration>,
}

impl PendingEvent {
    fn take(&mut self) -> Option<SseFrame> {
        let pending = std::mem::take(self);
        if pending.data.is_empty() {
            return None;
        }
        let data = pending.data.join("\n");
        if data == DONE_PAYLOAD {
            return Some(SseFrame::Done);
        }
        Some(SseFrame::Event(SseEvent {
            event: pending.event,
            data,
            id: pending.id,
            retry: pending.retry,
        }))
    }
}

/// Incremental SSE parser.
///
/// Holds at most one partial line and one pending event.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: BytesMut,
    // Bytes of `buffer` already known to hold no newline.
    scanned: usize,
    pending: PendingEvent,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(self.scanned + offset);
            self.buffer.advance(1);
            self.scanned = 0;
            let line = decode_line(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        self.scanned = self.buffer.len();
        frames
    }

    /// Flush at end of input. Leftover data is reported, not dispatched.
    pub fn finish(&mut self) -> Option<SseFrame> {
        self.scanned = 0;
        let tail = decode_line(&self.buffer.split());
        let mut residual = std::mem::take(&mut self.pending).data;
        if !tail.trim().is_empty() {
            residual.push(tail);
        }
        if residual.is_empty() {
            return None;
        }
        Some(SseFrame::Incomplete(residual.join("\n")))
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.pending.take();
        }
        if let Some(comment) = line.strip_prefix(':') {
            return Some(SseFrame::Comment(strip_one_space(comment).to_string()));
        }

        match line.split_once(':') {
            Some(("data", value)) => self.pending.data.push(strip_one_space(value).to_string()),
            Some(("event", value)) => {
                let value = strip_one_space(value);
                self.pending.event = (!value.is_empty()).then(|| value.to_string());
            }
            Some(("id", value)) => {
                let value = strip_one_space(value);
                if !value.contains('\0') {
                    self.pending.id = Some(value.to_string());
                }
            }
            Some(("retry", value)) => {
                if let Ok(ms) = strip_one_space(value).trim().parse::<u64>() {
                    self.pending.retry = Some(Duration::from_millis(ms));
                }
            }
            // Anything else continues the data payload.
            _ => self.pending.data.push(line.to_string()),
        }
        None
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

fn strip_one_space(value: &str) -> &str {
    value.strip_prefix(' ').unwrap_or(value)
}

/// Lazily parse a byte stream into SSE frames.
///
/// Frames come out in arrival order, each exactly once. End of input flushes
/// an [`SseFrame::Incomplete`] when data was left dangling. A read error is
/// yielded once and ends the stream.
pub fn reframe(mut input: ByteStream) -> FrameStream {
    Box::pin(async_stream::stream! {
        let mut parser = SseParser::new();
        while let Some(chunk) = input.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in parser.feed(&bytes) {
                        yield Ok(frame);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        if let Some(frame) = parser.finish() {
            yield Ok(frame);
        }
    })
}

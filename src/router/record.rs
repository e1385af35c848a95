//! Request lifecycle records
//!
//! Every routed request owns one [`RequestRecord`]. Whatever way the request
//! ends, the record emits exactly one `request_complete` or `request_error`
//! event and bumps the provider's counters. A record dropped before it was
//! finished (the caller went away) is reported as cancelled.

use std::sync::Arc;
use std::time::Instant;

use super::stats::RequestStats;
use crate::error::LlmError;

/// Provider name used before the model identifier is resolved.
pub const UNKNOWN_PROVIDER: &str = "unknown";

/// Status recorded for requests abandoned by the caller.
const CLIENT_CLOSED_STATUS: u16 = 499;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Unvalidated,
    Validated,
    Dispatched,
    Completed,
    Failed,
}

impl RequestState {
    fn is_terminal(self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Failed)
    }
}

#[derive(Debug)]
pub struct RequestRecord {
    provider: String,
    model: String,
    annotation: Option<String>,
    stream: bool,
    started: Instant,
    input_tokens: u64,
    output_tokens: u64,
    state: RequestState,
    stats: Arc<RequestStats>,
}

impl RequestRecord {
    pub fn new(model: &str, stream: bool, stats: Arc<RequestStats>) -> Self {
        Self {
            provider: UNKNOWN_PROVIDER.to_string(),
            model: model.to_string(),
            annotation: None,
            stream,
            started: Instant::now(),
            input_tokens: 0,
            output_tokens: 0,
            state: RequestState::Unvalidated,
            stats,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Attach the resolved route and emit `request_start`.
    ///
    /// `messages` is only logged when message logging is enabled.
    pub fn validated(
        &mut self,
        provider: &str,
        model: &str,
        annotation: Option<&str>,
        input_tokens: u64,
        messages: Option<&str>,
    ) {
        self.provider = provider.to_string();
        self.model = model.to_string();
        self.annotation = annotation.map(str::to_string);
        self.input_tokens = input_tokens;
        self.state = RequestState::Validated;
        tracing::info!(
            event = "request_start",
            provider = %self.provider,
            model = %self.model,
            annotation = self.annotation.as_deref(),
            stream = self.stream,
            input_tokens,
            messages,
        );
    }

    pub fn dispatched(&mut self) {
        self.state = RequestState::Dispatched;
    }

    pub fn set_output_tokens(&mut self, tokens: u64) {
        self.output_tokens = tokens;
    }

    /// Emit `request_complete` and count a success.
    pub fn complete(&mut self, status: u16, response: Option<&str>) {
        if self.state.is_terminal() {
            return;
        }
        self.state = RequestState::Completed;
        self.stats.record_success(&self.provider);
        tracing::info!(
            event = "request_complete",
            provider = %self.provider,
            model = %self.model,
            stream = self.stream,
            status,
            duration_ms = self.elapsed_ms(),
            input_tokens = self.input_tokens,
            output_tokens = self.output_tokens,
            outcome = "success",
            response,
        );
    }

    /// Emit `request_error` for `error` and count a failure.
    pub fn fail(&mut self, error: &LlmError) {
        self.fail_with(error.status_code(), error.kind().as_str(), &error.to_string());
    }

    /// Failure with an upstream status that was returned to the caller as a value.
    pub fn fail_upstream(&mut self, status: u16, message: &str) {
        self.fail_with(status, "upstream_error", message);
    }

    fn fail_with(&mut self, status: u16, outcome: &str, error: &str) {
        if self.state.is_terminal() {
            return;
        }
        let reached = self.state;
        self.state = RequestState::Failed;
        self.stats.record_failure(&self.provider);
        tracing::error!(
            event = "request_error",
            provider = %self.provider,
            model = %self.model,
            stream = self.stream,
            status,
            duration_ms = self.elapsed_ms(),
            input_tokens = self.input_tokens,
            output_tokens = self.output_tokens,
            outcome,
            reached = ?reached,
            error,
        );
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

impl Drop for RequestRecord {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.fail_with(CLIENT_CLOSED_STATUS, "cancelled", "request dropped before completion");
        }
    }
}

//! OpenAI-compatible dialect
//!
//! Covers OpenAI itself and every vendor speaking the same chat-completions
//! schema (DeepSeek, OpenRouter, local servers, ...). Requests pass through
//! nearly unchanged; responses and stream chunks are normalized only where
//! upstreams are known to omit fields.

use serde_json::{Map, Value};

use super::{ProviderAdapter, apply_param_config, sse_chunk_stream, synthesized_id};
use crate::config::ModelConfig;
use crate::error::LlmError;
use crate::streaming::{ByteStream, ChunkStream};
use crate::types::{ChatChoice, ChatRequest, ChatResponse, ResponseMessage, Usage};

pub const ADAPTER_TYPE: &str = "openai";

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiAdapter;

impl OpenAiAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn adapter_type(&self) -> &'static str {
        ADAPTER_TYPE
    }

    fn prepare_request(
        &self,
        request: &ChatRequest,
        model: &str,
        model_config: &ModelConfig,
    ) -> Result<Value, LlmError> {
        let mut payload = Map::new();
        payload.insert("model".into(), Value::String(model.to_string()));
        payload.insert("messages".into(), serde_json::to_value(&request.messages)?);
        payload.insert("stream".into(), Value::Bool(request.stream));
        if let Some(temperature) = request.temperature {
            payload.insert("temperature".into(), temperature.into());
        }
        for (key, value) in &request.extra {
            if !value.is_null() {
                payload.insert(key.clone(), value.clone());
            }
        }

        apply_param_config(&mut payload, &model_config.param_config);
        Ok(Value::Object(payload))
    }

    fn process_response(&self, raw: Value) -> Result<ChatResponse, LlmError> {
        let Value::Object(raw) = raw else {
            return Err(LlmError::ValidationError("Invalid response format".into()));
        };
        let choices = match raw.get("choices") {
            Some(Value::Array(choices)) => choices,
            Some(_) => {
                return Err(LlmError::ValidationError(
                    "Response choices field is not a list".into(),
                ));
            }
            None => {
                return Err(LlmError::ValidationError(
                    "Response missing choices field".into(),
                ));
            }
        };

        let choices = choices
            .iter()
            .enumerate()
            .map(|(i, choice)| normalize_choice(i, choice))
            .collect();

        let usage = raw.get("usage").map(parse_usage).unwrap_or_default();

        Ok(ChatResponse {
            id: raw
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(synthesized_id),
            object: raw
                .get("object")
                .and_then(Value::as_str)
                .unwrap_or("chat.completion")
                .to_string(),
            created: raw
                .get("created")
                .and_then(Value::as_i64)
                .unwrap_or_else(|| chrono::Utc::now().timestamp()),
            model: raw
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            choices,
            usage,
        })
    }

    fn process_stream(&self, body: ByteStream) -> ChunkStream {
        let stream_id = synthesized_id();
        sse_chunk_stream(ADAPTER_TYPE, body, move |mut chunk| {
            // Already canonical; only fill in an id when the upstream left it out.
            if let Value::Object(fields) = &mut chunk
                && !fields.get("id").is_some_and(Value::is_string)
            {
                fields.insert("id".into(), Value::String(stream_id.clone()));
            }
            Some(chunk)
        })
    }
}

fn normalize_choice(position: usize, choice: &Value) -> ChatChoice {
    let index = choice
        .get("index")
        .and_then(Value::as_u64)
        .and_then(|index| u32::try_from(index).ok())
        .unwrap_or_else(|| u32::try_from(position).unwrap_or(u32::MAX));

    let mut extra = match choice.get("message") {
        Some(Value::Object(message)) => message.clone(),
        _ => Map::new(),
    };
    let role = match extra.remove("role") {
        Some(Value::String(role)) => role,
        _ => "assistant".to_string(),
    };
    let content = match extra.remove("content") {
        Some(Value::String(text)) => Some(text),
        _ => None,
    };

    ChatChoice {
        index,
        message: ResponseMessage {
            role,
            content,
            extra,
        },
        finish_reason: choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// Read a usage object, computing `total_tokens` when the upstream omits it.
fn parse_usage(usage: &Value) -> Usage {
    let field = |name: &str| usage.get(name).and_then(Value::as_u64);
    let prompt = field("prompt_tokens").unwrap_or(0);
    let completion = field("completion_tokens").unwrap_or(0);
    Usage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: field("total_tokens").unwrap_or_else(|| prompt.saturating_add(completion)),
    }
}

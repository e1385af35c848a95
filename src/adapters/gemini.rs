//! Gemini `generateContent` dialect
//!
//! Messages become `contents` with `assistant` renamed to `model`; system
//! messages move to `systemInstruction`; sampling settings go under
//! `generationConfig`. Streaming uses `streamGenerateContent?alt=sse`.

use reqwest::header::{HeaderMap, HeaderName};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};

use super::{
    ProviderAdapter, apply_param_config, error_body, secret_header, sse_chunk_stream,
    synthesized_id,
};
use crate::config::ModelConfig;
use crate::error::LlmError;
use crate::streaming::{ByteStream, ChunkStream};
use crate::types::{
    ChatChoice, ChatCompletionChunk, ChatMessage, ChatRequest, ChatResponse, MessageContent,
    ResponseMessage, Usage,
};

pub const ADAPTER_TYPE: &str = "gemini";

const API_KEY_HEADER: &str = "x-goog-api-key";
const FALLBACK_MODEL: &str = "gemini";

/// Canonical parameter -> `generationConfig` field.
const GENERATION_FIELDS: &[(&str, &str)] = &[
    ("max_tokens", "maxOutputTokens"),
    ("top_p", "topP"),
    ("top_k", "topK"),
    ("stop", "stopSequences"),
    ("n", "candidateCount"),
    ("presence_penalty", "presencePenalty"),
    ("frequency_penalty", "frequencyPenalty"),
    ("seed", "seed"),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiAdapter;

impl GeminiAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl ProviderAdapter for GeminiAdapter {
    fn adapter_type(&self) -> &'static str {
        ADAPTER_TYPE
    }

    fn prepare_request(
        &self,
        request: &ChatRequest,
        _model: &str,
        model_config: &ModelConfig,
    ) -> Result<Value, LlmError> {
        let mut contents = Vec::new();
        let mut system_parts = Vec::new();
        for message in &request.messages {
            let parts = text_parts(message);
            match message.role.as_str() {
                "system" | "developer" => system_parts.extend(parts),
                "assistant" => contents.push(json!({"role": "model", "parts": parts})),
                other => contents.push(json!({"role": other, "parts": parts})),
            }
        }

        let mut generation = Map::new();
        if let Some(temperature) = request.temperature {
            generation.insert("temperature".into(), temperature.into());
        }

        let mut payload = Map::new();
        payload.insert("contents".into(), Value::Array(contents));
        if !system_parts.is_empty() {
            payload.insert("systemInstruction".into(), json!({ "parts": system_parts }));
        }
        for (key, value) in &request.extra {
            if value.is_null() {
                continue;
            }
            match GENERATION_FIELDS.iter().find(|(canonical, _)| *canonical == key.as_str()) {
                Some((_, native)) => {
                    let value = match (*native, value) {
                        ("stopSequences", Value::String(single)) => json!([single]),
                        _ => value.clone(),
                    };
                    generation.insert((*native).to_string(), value);
                }
                None => {
                    payload.insert(key.clone(), value.clone());
                }
            }
        }
        if !generation.is_empty() {
            payload.insert("generationConfig".into(), Value::Object(generation));
        }

        apply_param_config(&mut payload, &model_config.param_config);
        Ok(Value::Object(payload))
    }

    fn process_response(&self, raw: Value) -> Result<ChatResponse, LlmError> {
        let Value::Object(raw) = raw else {
            return Err(LlmError::ValidationError("Invalid response format".into()));
        };
        let candidate = match raw.get("candidates") {
            Some(Value::Array(candidates)) if !candidates.is_empty() => &candidates[0],
            _ => {
                return Err(LlmError::ValidationError(
                    "Empty response from Gemini API".into(),
                ));
            }
        };

        Ok(ChatResponse {
            id: string_field(&raw, "responseId").unwrap_or_else(synthesized_id),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: string_field(&raw, "modelVersion").unwrap_or_else(|| FALLBACK_MODEL.to_string()),
            choices: vec![ChatChoice {
                index: 0,
                message: ResponseMessage {
                    role: "assistant".to_string(),
                    content: Some(candidate_text(candidate)),
                    extra: Map::new(),
                },
                finish_reason: Some(
                    candidate
                        .get("finishReason")
                        .and_then(Value::as_str)
                        .map(finish_reason)
                        .unwrap_or_else(|| "stop".to_string()),
                ),
            }],
            usage: raw.get("usageMetadata").map(parse_usage).unwrap_or_default(),
        })
    }

    fn process_stream(&self, body: ByteStream) -> ChunkStream {
        let stream_id = synthesized_id();
        let created = chrono::Utc::now().timestamp();
        sse_chunk_stream(ADAPTER_TYPE, body, move |payload| {
            let candidate = payload.get("candidates")?.as_array()?.first()?;
            let model = payload
                .get("modelVersion")
                .and_then(Value::as_str)
                .unwrap_or(FALLBACK_MODEL);
            let chunk = ChatCompletionChunk::text_delta(
                stream_id.clone(),
                created,
                model,
                Some(candidate_text(candidate)),
                candidate
                    .get("finishReason")
                    .and_then(Value::as_str)
                    .map(finish_reason),
            );
            serde_json::to_value(chunk).ok()
        })
    }

    fn endpoint(&self, base_url: &str, model: &str, stream: bool) -> String {
        let url = base_url.replace("{model}", model);
        if stream && let Some(prefix) = url.strip_suffix(":generateContent") {
            return format!("{prefix}:streamGenerateContent?alt=sse");
        }
        url
    }

    fn handle_error(&self, error: &LlmError, status_code: u16) -> Value {
        error_body(error, status_code, true)
    }

    fn get_headers(&self, api_key: &SecretString) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            HeaderName::from_static(API_KEY_HEADER),
            secret_header(api_key.expose_secret())?,
        );
        Ok(headers)
    }
}

fn text_parts(message: &ChatMessage) -> Vec<Value> {
    match &message.content {
        MessageContent::Text(text) => vec![json!({ "text": text })],
        MessageContent::Parts(_) => vec![json!({ "text": message.content.text() })],
        MessageContent::Empty(()) => vec![json!({ "text": "" })],
    }
}

fn candidate_text(candidate: &Value) -> String {
    candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

fn finish_reason(native: &str) -> String {
    match native {
        "STOP" => "stop".to_string(),
        "MAX_TOKENS" => "length".to_string(),
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            "content_filter".to_string()
        }
        other => other.to_lowercase(),
    }
}

fn parse_usage(meta: &Value) -> Usage {
    let field = |name: &str| meta.get(name).and_then(Value::as_u64);
    let prompt = field("promptTokenCount").unwrap_or(0);
    let completion = field("candidatesTokenCount").unwrap_or(0);
    Usage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: field("totalTokenCount").unwrap_or_else(|| prompt.saturating_add(completion)),
    }
}

fn string_field(raw: &Map<String, Value>, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

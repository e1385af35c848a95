//! Axum HTTP surface
//!
//! [`app`] builds an `axum::Router` around a shared gateway [`Router`]. Streaming
//! requests are answered with the router's canonical chunks verbatim, so the
//! body is already valid `text/event-stream`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use futures::StreamExt;
use serde_json::Value;

use super::{bearer_token, error_parts};
use crate::error::LlmError;
use crate::router::{RouteResponse, Router};
use crate::types::ChatRequest;

/// Build the HTTP application.
pub fn app(gateway: Arc<Router>) -> axum::Router {
    axum::Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
        .route("/v1/stats", get(stats))
        .with_state(gateway)
}

/// `LlmError` rendered as its envelope.
#[derive(Debug)]
pub struct ApiError(pub LlmError);

impl From<LlmError> for ApiError {
    fn from(error: LlmError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = error_parts(&self.0);
        json_response(status, body)
    }
}

async fn chat_completions(
    State(gateway): State<Arc<Router>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let api_key = bearer_token(headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()));
    let request: ChatRequest = serde_json::from_slice(&body)
        .map_err(|e| LlmError::ValidationError(format!("Invalid request body: {e}")))?;

    if request.stream {
        let chunks = gateway.route_request_stream(api_key, request).await?;
        let body = Body::from_stream(chunks.map(Ok::<_, Infallible>));
        let mut response = Response::new(body);
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        return Ok(response);
    }

    match gateway.route_request(api_key, request).await? {
        RouteResponse::Completion(completion) => Ok(Json(completion).into_response()),
        RouteResponse::UpstreamError(envelope) => Ok(json_response(envelope.code, envelope.to_json())),
    }
}

async fn list_models(State(gateway): State<Arc<Router>>) -> Response {
    Json(gateway.list_models()).into_response()
}

async fn stats(State(gateway): State<Arc<Router>>) -> Response {
    Json(gateway.stats()).into_response()
}

fn json_response(status: u16, body: Value) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

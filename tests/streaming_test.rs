//! Reframing real upstream captures, independent of how the bytes are split.

mod support;

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream;
use llm_bridge::adapters::{GeminiAdapter, OpenAiAdapter, ProviderAdapter};
use llm_bridge::error::LlmError;
use llm_bridge::streaming::{ByteStream, SseFrame, reframe};
use support::{ACCESS_KEY, CountingTransport, fixture, gateway_config};
use tracing_test::traced_test;

fn split_into(body: &str, size: usize) -> ByteStream {
    let chunks: Vec<Result<Bytes, LlmError>> = body
        .as_bytes()
        .chunks(size)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    Box::pin(stream::iter(chunks))
}

async fn frames(body: ByteStream) -> Vec<SseFrame> {
    reframe(body).map(|frame| frame.unwrap()).collect().await
}

#[tokio::test]
async fn frames_do_not_depend_on_chunk_boundaries() {
    let body = fixture("openai_stream.sse");
    let whole = frames(split_into(&body, body.len())).await;
    assert_eq!(whole.len(), 5);
    assert!(matches!(whole[0], SseFrame::Comment(_)));
    assert_eq!(whole[4], SseFrame::Done);

    for size in [1, 2, 3, 7, 64, 333] {
        assert_eq!(frames(split_into(&body, size)).await, whole, "chunk size {size}");
    }
}

#[tokio::test]
async fn crlf_bodies_frame_identically() {
    let body = fixture("gemini_stream.sse");
    let crlf = body.replace('\n', "\r\n");
    assert_eq!(
        frames(split_into(&crlf, 5)).await,
        frames(split_into(&body, body.len())).await
    );
}

#[tokio::test]
async fn adapters_rewrite_fixtures() {
    let openai: Vec<_> = OpenAiAdapter::new()
        .process_stream(split_into(&fixture("openai_stream.sse"), 11))
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(openai.len(), 4);
    assert_eq!(openai[3], "data: [DONE]\n\n");

    let gemini: Vec<_> = GeminiAdapter::new()
        .process_stream(split_into(&fixture("gemini_stream.sse"), 13))
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(gemini.len(), 2);
    assert!(gemini.iter().all(|chunk| chunk.contains("chat.completion.chunk")));
}

#[tokio::test]
async fn malformed_frames_are_skipped() {
    let body = "data: {oops\n\ndata: {\"choices\":[]}\n\ndata: [DONE]\n\n";
    let chunks: Vec<_> = OpenAiAdapter::new()
        .process_stream(split_into(body, 4))
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(chunks.len(), 2);
    assert!(chunks[0].contains("\"choices\":[]"));
}

#[tokio::test]
#[traced_test]
async fn outcome_and_incomplete_tail_are_logged() {
    let transport = CountingTransport::new(200, fixture("truncated_stream.sse"));
    let router = llm_bridge::Router::builder(std::sync::Arc::new(
        llm_bridge::config::StaticConfigStore::new(gateway_config("http://127.0.0.1:9")),
    ))
    .transport(transport)
    .build()
    .unwrap();

    let request = llm_bridge::types::ChatRequest::new(
        "openai/gpt-4o-mini",
        vec![llm_bridge::types::ChatMessage::user("hi")],
    );
    let chunks: Vec<String> = router
        .route_request_stream(ACCESS_KEY, request)
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(chunks.last().map(String::as_str), Some("data: [DONE]\n\n"));
    assert!(logs_contain("incomplete data discarded"));
    assert!(logs_contain("request_start"));
    assert!(logs_contain("request_complete"));
    assert!(!logs_contain("sk-upstream-openai"));
}

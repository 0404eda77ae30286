//! Wire-level tests for the Anthropic adapter

use polyroute::provider::anthropic::AnthropicProvider;
use polyroute::provider::{CompletionOptions, Provider, StreamEvent};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn adapter_against(server: &MockServer) -> AnthropicProvider {
    AnthropicProvider::with_base_url("anthropic", &server.uri(), "key-1", "claude-sonnet-4-20250514")
        .expect("adapter should construct")
}

#[tokio::test]
async fn test_complete_sends_required_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "key-1"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": "claude-sonnet-4-20250514",
            "content": [{"type": "text", "text": "hello"}],
            "usage": {"input_tokens": 11, "output_tokens": 4},
        })))
        .mount(&server)
        .await;

    let provider = adapter_against(&server).await;
    let response = provider
        .complete("hi", &CompletionOptions::default())
        .await
        .expect("complete should succeed");

    assert_eq!(response.text, "hello");
    assert_eq!(response.prompt_tokens, 11);
    assert_eq!(response.completion_tokens, 4);
}

#[tokio::test]
async fn test_complete_joins_content_blocks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": "claude-sonnet-4-20250514",
            "content": [
                {"type": "text", "text": "part one, "},
                {"type": "text", "text": "part two"},
            ],
            "usage": {"input_tokens": 5, "output_tokens": 8},
        })))
        .mount(&server)
        .await;

    let provider = adapter_against(&server).await;
    let response = provider
        .complete("hi", &CompletionOptions::default())
        .await
        .expect("complete should succeed");

    assert_eq!(response.text, "part one, part two");
}

#[tokio::test]
async fn test_complete_overloaded_is_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(529))
        .mount(&server)
        .await;

    let provider = adapter_against(&server).await;
    let result = provider.complete("hi", &CompletionOptions::default()).await;
    assert!(result.is_err());

    let metrics = provider.metrics();
    assert_eq!(metrics.total_requests, 1);
    assert_eq!(metrics.successful_requests, 0);
}

#[tokio::test]
async fn test_stream_parses_event_frames() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"type\":\"message_start\"}\n\n",
        "data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"alpha\"}}\n\n",
        "data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\" beta\"}}\n\n",
        "data: {\"type\":\"message_delta\",\"usage\":{\"output_tokens\":6}}\n\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let provider = adapter_against(&server).await;
    let tokens = Arc::new(Mutex::new(Vec::new()));
    let done_tokens = Arc::new(Mutex::new(None));
    let token_sink = tokens.clone();
    let done_sink = done_tokens.clone();

    provider
        .complete_stream(
            "hi",
            &CompletionOptions::default(),
            Box::new(move |event| match event {
                StreamEvent::Token(text) => token_sink.lock().expect("test lock").push(text),
                StreamEvent::Done {
                    completion_tokens, ..
                } => *done_sink.lock().expect("test lock") = Some(completion_tokens),
            }),
            CancellationToken::new(),
        )
        .await
        .expect("stream should succeed");

    assert_eq!(tokens.lock().expect("test lock").join(""), "alpha beta");
    // message_delta carried the authoritative output token count
    assert_eq!(*done_tokens.lock().expect("test lock"), Some(6));
}

#[tokio::test]
async fn test_initialize_probes_models_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .and(header("x-api-key", "key-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"id": "claude-sonnet-4-20250514"}],
        })))
        .mount(&server)
        .await;

    let provider = adapter_against(&server).await;
    provider.initialize().await.expect("initialize should succeed");
    assert!(provider.is_ready());

    let models = provider.list_models().await.expect("should list");
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].provider, "anthropic");
}

//! Integration tests for streaming dispatch
//!
//! Streaming requires the `streaming` capability and never falls back:
//! resuming a half-delivered stream on another provider is out of scope,
//! so failures surface directly.

mod common;

use common::{MockProvider, fast_settings};
use polyroute::error::AppError;
use polyroute::provider::{Capability, CompletionOptions, StreamEvent};
use polyroute::router::{ModelRouter, RouteContext};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

fn collecting_callback() -> (Arc<Mutex<Vec<String>>>, polyroute::provider::StreamCallback) {
    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = collected.clone();
    let callback = Box::new(move |event: StreamEvent| {
        if let StreamEvent::Token(text) = event {
            if let Ok(mut tokens) = sink.lock() {
                tokens.push(text);
            }
        }
    });
    (collected, callback)
}

#[tokio::test]
async fn test_stream_delivers_tokens() {
    let router = ModelRouter::new(fast_settings()).expect("router should build");
    router
        .register_provider(MockProvider::new("streamer").arc())
        .await
        .expect("register should succeed");

    let (collected, callback) = collecting_callback();
    router
        .route_stream(
            "hi",
            &CompletionOptions::default(),
            callback,
            &RouteContext::default(),
            CancellationToken::new(),
        )
        .await
        .expect("stream should succeed");

    assert_eq!(
        collected.lock().expect("no poisoned lock in test").as_slice(),
        ["mock".to_string()]
    );

    router.cleanup().await;
}

#[tokio::test]
async fn test_stream_failure_does_not_fall_back() {
    let router = ModelRouter::new(fast_settings()).expect("router should build");

    let broken = MockProvider::new("broken").always_fail().arc();
    let backup = MockProvider::new("backup").arc();
    for provider in [broken.clone(), backup.clone()] {
        router
            .register_provider(provider)
            .await
            .expect("register should succeed");
    }

    let (_, callback) = collecting_callback();
    let result = router
        .route_stream(
            "hi",
            &CompletionOptions::default(),
            callback,
            &RouteContext::default(),
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(AppError::StreamFailed { .. })));
    // The backup was never attempted
    assert_eq!(backup.calls(), 0);

    let metrics = router.get_metrics().await;
    assert_eq!(metrics.fallbacks_used, 0);

    router.cleanup().await;
}

#[tokio::test]
async fn test_stream_requires_streaming_capability() {
    let router = ModelRouter::new(fast_settings()).expect("router should build");

    // Chat-only provider: eligible for route, invisible to route_stream
    let chat_only = MockProvider::new("chat-only")
        .with_capabilities(HashSet::from([Capability::Completion, Capability::Chat]))
        .arc();
    router
        .register_provider(chat_only)
        .await
        .expect("register should succeed");

    let (_, callback) = collecting_callback();
    let result = router
        .route_stream(
            "hi",
            &CompletionOptions::default(),
            callback,
            &RouteContext::default(),
            CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(AppError::NoProviders { .. })));

    // The same provider still serves non-streaming traffic
    router
        .route("hi", &CompletionOptions::default(), &RouteContext::default())
        .await
        .expect("route should succeed");

    router.cleanup().await;
}

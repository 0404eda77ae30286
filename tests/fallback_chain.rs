//! Integration tests for fallback-on-failure behaviour

mod common;

use common::{MockProvider, fast_settings};
use polyroute::error::AppError;
use polyroute::provider::CompletionOptions;
use polyroute::router::{ModelRouter, RouteContext, RouterSettings};

#[tokio::test]
async fn test_first_succeeding_fallback_stops_the_chain() {
    let router = ModelRouter::new(fast_settings()).expect("router should build");

    let primary = MockProvider::new("primary").always_fail().arc();
    let second = MockProvider::new("second").arc();
    let third = MockProvider::new("third").arc();
    for provider in [primary.clone(), second.clone(), third.clone()] {
        router
            .register_provider(provider)
            .await
            .expect("register should succeed");
    }

    let response = router
        .route("hi", &CompletionOptions::default(), &RouteContext::default())
        .await
        .expect("fallback should succeed");

    assert_eq!(response.text, "response from second");
    assert_eq!(primary.calls(), 1);
    assert_eq!(second.calls(), 1);
    // The chain stopped at the first success
    assert_eq!(third.calls(), 0);

    // fallbacks_used counts the call once, not per attempted provider
    let metrics = router.get_metrics().await;
    assert_eq!(metrics.fallbacks_used, 1);
    assert_eq!(metrics.successful_routings, 1);

    router.cleanup().await;
}

#[tokio::test]
async fn test_fallback_disabled_fails_fast() {
    let settings = RouterSettings {
        fallback_enabled: false,
        ..fast_settings()
    };
    let router = ModelRouter::new(settings).expect("router should build");

    let primary = MockProvider::new("primary").always_fail().arc();
    let backup = MockProvider::new("backup").arc();
    for provider in [primary.clone(), backup.clone()] {
        router
            .register_provider(provider)
            .await
            .expect("register should succeed");
    }

    let result = router
        .route("hi", &CompletionOptions::default(), &RouteContext::default())
        .await;

    match result {
        Err(AppError::AllProvidersFailed { failures }) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].provider, "primary");
        }
        other => panic!("expected AllProvidersFailed, got {:?}", other.map(|r| r.text)),
    }
    assert_eq!(backup.calls(), 0);

    let metrics = router.get_metrics().await;
    assert_eq!(metrics.fallbacks_used, 0);

    router.cleanup().await;
}

#[tokio::test]
async fn test_each_attempt_feeds_its_own_breaker() {
    let router = ModelRouter::new(fast_settings()).expect("router should build");

    let primary = MockProvider::new("primary").always_fail().arc();
    let flaky = MockProvider::new("flaky").fail_next(1).arc();
    let solid = MockProvider::new("solid").arc();
    for provider in [primary.clone(), flaky.clone(), solid.clone()] {
        router
            .register_provider(provider)
            .await
            .expect("register should succeed");
    }

    let response = router
        .route("hi", &CompletionOptions::default(), &RouteContext::default())
        .await
        .expect("chain should reach the solid provider");
    assert_eq!(response.text, "response from solid");

    // Both failing providers were attempted exactly once each
    assert_eq!(primary.calls(), 1);
    assert_eq!(flaky.calls(), 1);
    assert_eq!(solid.calls(), 1);

    router.cleanup().await;
}

//! Shared test support: a scriptable in-memory provider
#![allow(dead_code)]

use async_trait::async_trait;
use polyroute::error::{AppError, AppResult};
use polyroute::provider::{
    Capability, CompletionOptions, CompletionResponse, HealthStatus, ModelInfo, Provider,
    ProviderCapabilities, ProviderEvent, ProviderHealth, ProviderMetrics, StreamCallback,
    StreamEvent,
};
use polyroute::router::RouterSettings;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Router settings with short timers suitable for tests
pub fn fast_settings() -> RouterSettings {
    RouterSettings {
        health_check_interval: Duration::from_millis(20),
        circuit_breaker_cooldown: Duration::from_millis(60),
        ..Default::default()
    }
}

/// In-memory provider with scriptable failure behaviour
///
/// Negative `fail_budget` fails every call; a positive value fails that
/// many calls and then succeeds.
pub struct MockProvider {
    name: String,
    ready: AtomicBool,
    cleaned: AtomicBool,
    supported: HashSet<Capability>,
    cost_per_1k: f64,
    fail_budget: AtomicI64,
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    events: broadcast::Sender<ProviderEvent>,
}

impl MockProvider {
    pub fn new(name: &str) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            name: name.to_string(),
            ready: AtomicBool::new(true),
            cleaned: AtomicBool::new(false),
            supported: HashSet::from([
                Capability::Completion,
                Capability::Chat,
                Capability::Streaming,
            ]),
            cost_per_1k: 0.0,
            fail_budget: AtomicI64::new(0),
            total_calls: AtomicU64::new(0),
            successful_calls: AtomicU64::new(0),
            events,
        }
    }

    /// Shared handle, as the router consumes providers
    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn with_cost_per_1k(mut self, cost: f64) -> Self {
        self.cost_per_1k = cost;
        self
    }

    pub fn with_capabilities(mut self, supported: HashSet<Capability>) -> Self {
        self.supported = supported;
        self
    }

    pub fn not_ready(self) -> Self {
        self.ready.store(false, Ordering::SeqCst);
        self
    }

    pub fn always_fail(self) -> Self {
        self.fail_budget.store(-1, Ordering::SeqCst);
        self
    }

    pub fn fail_next(self, count: i64) -> Self {
        self.fail_budget.store(count, Ordering::SeqCst);
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u64 {
        self.total_calls.load(Ordering::SeqCst)
    }

    pub fn was_cleaned(&self) -> bool {
        self.cleaned.load(Ordering::SeqCst)
    }

    /// Publish a metrics snapshot, as a real adapter does after each request
    pub fn emit_metrics(&self, total: u64, successful: u64, average_ms: u64) {
        let _ = self
            .events
            .send(ProviderEvent::MetricsUpdated(ProviderMetrics {
                total_requests: total,
                successful_requests: successful,
                average_response_time: Duration::from_millis(average_ms),
            }));
    }

    /// Publish a health observation
    pub fn emit_health(&self, status: HealthStatus) {
        let _ = self
            .events
            .send(ProviderEvent::HealthUpdated(ProviderHealth {
                status,
                response_time: Duration::from_millis(1),
            }));
    }

    fn next_call_fails(&self) -> bool {
        let budget = self.fail_budget.load(Ordering::SeqCst);
        if budget < 0 {
            return true;
        }
        if budget > 0 {
            self.fail_budget.fetch_sub(1, Ordering::SeqCst);
            return true;
        }
        false
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> AppResult<()> {
        Ok(())
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            max_context_window: 8192,
            supported: self.supported.clone(),
        }
    }

    async fn complete(
        &self,
        _prompt: &str,
        _options: &CompletionOptions,
    ) -> AppResult<CompletionResponse> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        if self.next_call_fails() {
            return Err(AppError::ProviderFailed {
                provider: self.name.clone(),
                reason: "mock failure".to_string(),
            });
        }
        self.successful_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CompletionResponse {
            text: format!("response from {}", self.name),
            model: "mock-model".to_string(),
            prompt_tokens: 10,
            completion_tokens: 5,
            response_time: Duration::from_millis(5),
        })
    }

    async fn complete_stream(
        &self,
        _prompt: &str,
        _options: &CompletionOptions,
        mut on_event: StreamCallback,
        cancel: CancellationToken,
    ) -> AppResult<()> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        if self.next_call_fails() {
            return Err(AppError::StreamFailed {
                provider: self.name.clone(),
                reason: "mock stream failure".to_string(),
            });
        }
        self.successful_calls.fetch_add(1, Ordering::SeqCst);
        on_event(StreamEvent::Token("mock".to_string()));
        on_event(StreamEvent::Done {
            model: "mock-model".to_string(),
            completion_tokens: 1,
        });
        Ok(())
    }

    fn calculate_cost(
        &self,
        prompt_tokens: u32,
        completion_tokens: u32,
        _model: Option<&str>,
    ) -> f64 {
        (prompt_tokens + completion_tokens) as f64 / 1000.0 * self.cost_per_1k
    }

    async fn health(&self) -> ProviderHealth {
        let status = if self.is_ready() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        ProviderHealth {
            status,
            response_time: Duration::from_millis(1),
        }
    }

    fn metrics(&self) -> ProviderMetrics {
        ProviderMetrics {
            total_requests: self.total_calls.load(Ordering::SeqCst),
            successful_requests: self.successful_calls.load(Ordering::SeqCst),
            average_response_time: Duration::from_millis(5),
        }
    }

    async fn list_models(&self) -> AppResult<Vec<ModelInfo>> {
        Ok(vec![ModelInfo {
            id: format!("{}-model", self.name),
            provider: self.name.clone(),
            context_window: Some(8192),
        }])
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    async fn cleanup(&self) -> AppResult<()> {
        self.cleaned.store(true, Ordering::SeqCst);
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }
}

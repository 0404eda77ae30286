//! Scriptable stub provider for unit tests

use super::{
    Capability, CompletionOptions, CompletionResponse, HealthStatus, ModelInfo, Provider,
    ProviderCapabilities, ProviderEvent, ProviderHealth, ProviderMetrics, StreamCallback,
    StreamEvent,
};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// In-memory provider for exercising router logic without I/O
pub(crate) struct StubProvider {
    name: String,
    ready: AtomicBool,
    cost_per_1k: f64,
    fail_always: bool,
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    events: broadcast::Sender<ProviderEvent>,
}

impl StubProvider {
    pub fn new(name: &str) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            name: name.to_string(),
            ready: AtomicBool::new(true),
            cost_per_1k: 0.0,
            fail_always: false,
            total_calls: AtomicU64::new(0),
            successful_calls: AtomicU64::new(0),
            events,
        }
    }

    pub fn with_cost_per_1k(mut self, cost: f64) -> Self {
        self.cost_per_1k = cost;
        self
    }

    pub fn always_fail(mut self) -> Self {
        self.fail_always = true;
        self
    }
}

#[async_trait]
impl Provider for StubProvider {
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
            supported: HashSet::from([
                Capability::Completion,
                Capability::Chat,
                Capability::Streaming,
            ]),
        }
    }

    async fn complete(
        &self,
        _prompt: &str,
        _options: &CompletionOptions,
    ) -> AppResult<CompletionResponse> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_always {
            return Err(AppError::ProviderFailed {
                provider: self.name.clone(),
                reason: "stub failure".to_string(),
            });
        }
        self.successful_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CompletionResponse {
            text: "stub response".to_string(),
            model: "stub-model".to_string(),
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
        if self.fail_always {
            return Err(AppError::StreamFailed {
                provider: self.name.clone(),
                reason: "stub stream failure".to_string(),
            });
        }
        self.successful_calls.fetch_add(1, Ordering::SeqCst);
        on_event(StreamEvent::Token("stub".to_string()));
        on_event(StreamEvent::Done {
            model: "stub-model".to_string(),
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
        ProviderHealth {
            status: HealthStatus::Healthy,
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
            id: "stub-model".to_string(),
            provider: self.name.clone(),
            context_window: Some(8192),
        }])
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    async fn cleanup(&self) -> AppResult<()> {
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }
}

//! Provider abstraction for AI inference backends
//!
//! The router never depends on concrete backend types. Each backend adapter
//! (Ollama, OpenAI, Anthropic) implements the [`Provider`] trait and is
//! registered with the router as a trait object.

pub mod anthropic;
pub mod factory;
pub mod ollama;
pub mod openai;
mod stats;
#[cfg(test)]
pub(crate) mod testing;

pub use factory::build_providers;
pub use stats::AdapterCore;

use crate::error::AppResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// A discrete, advertised feature of a provider used to filter eligibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Completion,
    Chat,
    Streaming,
    Embeddings,
    CodeGeneration,
    FunctionCalling,
    VisionInput,
}

impl Capability {
    /// Convert to string representation for logging and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completion => "completion",
            Self::Chat => "chat",
            Self::Streaming => "streaming",
            Self::Embeddings => "embeddings",
            Self::CodeGeneration => "code_generation",
            Self::FunctionCalling => "function_calling",
            Self::VisionInput => "vision_input",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability advertisement returned by [`Provider::capabilities`]
#[derive(Debug, Clone)]
pub struct ProviderCapabilities {
    /// Largest context window supported by any of the provider's models
    pub max_context_window: usize,
    /// Features this provider can serve
    pub supported: HashSet<Capability>,
}

impl ProviderCapabilities {
    /// True if every required capability is advertised
    pub fn satisfies(&self, required: &HashSet<Capability>) -> bool {
        required.is_subset(&self.supported)
    }
}

/// Options forwarded to a provider's completion call
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CompletionOptions {
    /// Model override; the provider's default model is used when absent
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

/// A completed (non-streaming) inference response
#[derive(Debug, Clone, Serialize)]
pub struct CompletionResponse {
    pub text: String,
    /// Model that actually served the request
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    /// Wall-clock latency of the provider call
    #[serde(skip)]
    pub response_time: Duration,
}

/// Incremental event emitted during a streaming completion
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A chunk of generated text
    Token(String),
    /// Stream finished normally
    Done {
        model: String,
        completion_tokens: u32,
    },
}

/// Callback invoked for each [`StreamEvent`]
pub type StreamCallback = Box<dyn FnMut(StreamEvent) + Send>;

/// Coarse health classification reported by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health snapshot returned by [`Provider::health`]
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub status: HealthStatus,
    /// Latency of the most recent health observation
    #[serde(skip)]
    pub response_time: Duration,
}

/// Aggregate request statistics maintained by the provider itself
///
/// The router samples these snapshots (via [`ProviderEvent::MetricsUpdated`])
/// rather than tracking individual requests.
#[derive(Debug, Clone, Default)]
pub struct ProviderMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub average_response_time: Duration,
}

impl ProviderMetrics {
    /// Fraction of requests that succeeded, 1.0 when no traffic yet
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }
}

/// A model advertised by a provider, aggregated by `get_all_models`
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub provider: String,
    pub context_window: Option<usize>,
}

/// Push notification emitted by a provider as its state changes
///
/// Every event feeds exactly one success-or-failure signal into the
/// provider's circuit breaker; metrics events additionally append a
/// performance history sample.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    HealthUpdated(ProviderHealth),
    MetricsUpdated(ProviderMetrics),
}

/// Capability interface consumed by the router
///
/// Implementations own their backing resources; the router drives
/// `initialize`/`cleanup` but never assumes ownership beyond the `Arc`.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Unique provider identity; compared case-insensitively by the registry
    fn name(&self) -> &str;

    /// True once the provider can accept completion calls
    fn is_ready(&self) -> bool;

    /// Bring up the backing resource (connection probe, auth check)
    async fn initialize(&self) -> AppResult<()>;

    /// Advertised capability set
    fn capabilities(&self) -> ProviderCapabilities;

    /// Execute a completion against the backend
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> AppResult<CompletionResponse>;

    /// Execute a streaming completion, invoking `on_event` per chunk
    ///
    /// Implementations must return `AppError::Cancelled` when `cancel` fires
    /// mid-stream so the router can distinguish cancellation from failure.
    async fn complete_stream(
        &self,
        prompt: &str,
        options: &CompletionOptions,
        on_event: StreamCallback,
        cancel: CancellationToken,
    ) -> AppResult<()>;

    /// Estimate the cost in USD for a hypothetical request
    fn calculate_cost(&self, prompt_tokens: u32, completion_tokens: u32, model: Option<&str>)
    -> f64;

    /// Current health snapshot
    async fn health(&self) -> ProviderHealth;

    /// Aggregate request statistics snapshot
    fn metrics(&self) -> ProviderMetrics;

    /// Models served by this provider
    async fn list_models(&self) -> AppResult<Vec<ModelInfo>>;

    /// Subscribe to health/metrics update events
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;

    /// Release the backing resource; called on unregister and router cleanup
    async fn cleanup(&self) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_as_str() {
        assert_eq!(Capability::Streaming.as_str(), "streaming");
        assert_eq!(Capability::CodeGeneration.as_str(), "code_generation");
    }

    #[test]
    fn test_capability_serde() {
        assert_eq!(
            serde_json::from_str::<Capability>(r#""streaming""#).unwrap(),
            Capability::Streaming
        );
        assert_eq!(
            serde_json::from_str::<Capability>(r#""code_generation""#).unwrap(),
            Capability::CodeGeneration
        );
    }

    #[test]
    fn test_capabilities_satisfies_subset() {
        let caps = ProviderCapabilities {
            max_context_window: 8192,
            supported: HashSet::from([Capability::Chat, Capability::Streaming]),
        };

        assert!(caps.satisfies(&HashSet::new()));
        assert!(caps.satisfies(&HashSet::from([Capability::Chat])));
        assert!(caps.satisfies(&HashSet::from([Capability::Chat, Capability::Streaming])));
        assert!(!caps.satisfies(&HashSet::from([Capability::Embeddings])));
    }

    #[test]
    fn test_provider_metrics_success_rate() {
        let empty = ProviderMetrics::default();
        assert_eq!(empty.success_rate(), 1.0);

        let metrics = ProviderMetrics {
            total_requests: 10,
            successful_requests: 7,
            average_response_time: Duration::from_millis(120),
        };
        assert!((metrics.success_rate() - 0.7).abs() < f64::EPSILON);
    }
}

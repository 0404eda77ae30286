//! Anthropic backend adapter
//!
//! Drives the Anthropic Messages API. Requires `max_tokens` on every
//! request, so a default is applied when the caller does not set one.

use super::{
    AdapterCore, Capability, CompletionOptions, CompletionResponse, HealthStatus, ModelInfo,
    Provider, ProviderCapabilities, ProviderEvent, ProviderHealth, ProviderMetrics,
    StreamCallback, StreamEvent, stats::LineBuffer,
};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEGRADED_LATENCY: Duration = Duration::from_secs(10);

/// Cost per million tokens: (prompt, completion)
fn model_rates(model: &str) -> (f64, f64) {
    match model {
        m if m.contains("haiku") => (0.80, 4.00),
        m if m.contains("opus") => (15.00, 75.00),
        // Sonnet-class default, also used for unknown models
        _ => (3.00, 15.00),
    }
}

/// Adapter for the Anthropic Messages API
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
    ready: AtomicBool,
    core: AdapterCore,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    #[serde(default)]
    usage: MessageUsage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
struct MessageUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize)]
struct StreamFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<FrameDelta>,
    #[serde(default)]
    usage: Option<MessageUsage>,
}

#[derive(Deserialize, Default)]
struct FrameDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

impl AnthropicProvider {
    /// Create an adapter against the default Anthropic endpoint
    pub fn new(name: &str, api_key: &str, default_model: &str) -> AppResult<Self> {
        Self::with_base_url(name, DEFAULT_BASE_URL, api_key, default_model)
    }

    /// Create an adapter against a custom endpoint (used by tests)
    pub fn with_base_url(
        name: &str,
        base_url: &str,
        api_key: &str,
        default_model: &str,
    ) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| AppError::Internal(format!("HTTP client construction: {}", e)))?;

        Ok(Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            default_model: default_model.to_string(),
            client,
            ready: AtomicBool::new(false),
            core: AdapterCore::new(),
        })
    }

    fn model_for(&self, options: &CompletionOptions) -> String {
        options
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone())
    }

    fn messages_body(
        &self,
        prompt: &str,
        options: &CompletionOptions,
        stream: bool,
    ) -> serde_json::Value {
        serde_json::json!({
            "model": self.model_for(options),
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": options.temperature,
            "messages": [{"role": "user", "content": prompt}],
            "stream": stream,
        })
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
    }

    fn provider_error(&self, reason: String) -> AppError {
        AppError::ProviderFailed {
            provider: self.name.clone(),
            reason,
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> AppResult<()> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .send()
            .await
            .map_err(|e| self.provider_error(format!("initialization probe failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(
                self.provider_error(format!("initialization probe returned {}", response.status()))
            );
        }

        self.ready.store(true, Ordering::SeqCst);
        tracing::debug!(provider_name = %self.name, "Anthropic adapter initialized");
        Ok(())
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            max_context_window: 200_000,
            supported: HashSet::from([
                Capability::Completion,
                Capability::Chat,
                Capability::Streaming,
                Capability::CodeGeneration,
                Capability::VisionInput,
            ]),
        }
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> AppResult<CompletionResponse> {
        let url = format!("{}/messages", self.base_url);
        let started = Instant::now();

        let result = async {
            let response = self
                .request(&url)
                .json(&self.messages_body(prompt, options, false))
                .send()
                .await
                .map_err(|e| self.provider_error(e.to_string()))?;

            if !response.status().is_success() {
                return Err(
                    self.provider_error(format!("messages returned {}", response.status()))
                );
            }

            response
                .json::<MessagesResponse>()
                .await
                .map_err(|e| self.provider_error(format!("malformed messages response: {}", e)))
        }
        .await;

        let latency = started.elapsed();
        self.core.record(latency, result.is_ok());

        let body = result?;
        let text = body
            .content
            .into_iter()
            .map(|block| block.text)
            .collect::<String>();

        Ok(CompletionResponse {
            text,
            model: body.model,
            prompt_tokens: body.usage.input_tokens,
            completion_tokens: body.usage.output_tokens,
            response_time: latency,
        })
    }

    async fn complete_stream(
        &self,
        prompt: &str,
        options: &CompletionOptions,
        mut on_event: StreamCallback,
        cancel: CancellationToken,
    ) -> AppResult<()> {
        let url = format!("{}/messages", self.base_url);
        let started = Instant::now();
        let model = self.model_for(options);

        let response = self
            .request(&url)
            .json(&self.messages_body(prompt, options, true))
            .send()
            .await
            .map_err(|e| {
                self.core.record(started.elapsed(), false);
                AppError::StreamFailed {
                    provider: self.name.clone(),
                    reason: e.to_string(),
                }
            })?;

        if !response.status().is_success() {
            self.core.record(started.elapsed(), false);
            return Err(AppError::StreamFailed {
                provider: self.name.clone(),
                reason: format!("messages returned {}", response.status()),
            });
        }

        let mut body = response.bytes_stream();
        let mut lines = LineBuffer::new();
        let mut completion_tokens = 0u32;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                chunk = body.next() => chunk,
            };

            let Some(chunk) = chunk else { break };
            let chunk = chunk.map_err(|e| {
                self.core.record(started.elapsed(), false);
                AppError::StreamFailed {
                    provider: self.name.clone(),
                    reason: format!("stream interrupted: {}", e),
                }
            })?;

            for line in lines.push(&String::from_utf8_lossy(&chunk)) {
                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };

                let frame: StreamFrame = serde_json::from_str(data).map_err(|e| {
                    self.core.record(started.elapsed(), false);
                    AppError::StreamFailed {
                        provider: self.name.clone(),
                        reason: format!("malformed stream frame: {}", e),
                    }
                })?;

                match frame.kind.as_str() {
                    "content_block_delta" => {
                        if let Some(text) = frame.delta.and_then(|d| d.text) {
                            if !text.is_empty() {
                                completion_tokens += 1;
                                on_event(StreamEvent::Token(text));
                            }
                        }
                    }
                    "message_delta" => {
                        if let Some(usage) = frame.usage {
                            completion_tokens = usage.output_tokens;
                        }
                    }
                    "message_stop" => {
                        self.core.record(started.elapsed(), true);
                        on_event(StreamEvent::Done {
                            model,
                            completion_tokens,
                        });
                        return Ok(());
                    }
                    _ => {}
                }
            }
        }

        self.core.record(started.elapsed(), false);
        Err(AppError::StreamFailed {
            provider: self.name.clone(),
            reason: "stream ended before message_stop".to_string(),
        })
    }

    fn calculate_cost(
        &self,
        prompt_tokens: u32,
        completion_tokens: u32,
        model: Option<&str>,
    ) -> f64 {
        let (prompt_rate, completion_rate) =
            model_rates(model.unwrap_or(self.default_model.as_str()));
        prompt_tokens as f64 / 1_000_000.0 * prompt_rate
            + completion_tokens as f64 / 1_000_000.0 * completion_rate
    }

    async fn health(&self) -> ProviderHealth {
        let snapshot = self.core.snapshot();
        let status = if !self.is_ready() {
            HealthStatus::Unhealthy
        } else if snapshot.average_response_time > DEGRADED_LATENCY {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        ProviderHealth {
            status,
            response_time: snapshot.average_response_time,
        }
    }

    fn metrics(&self) -> ProviderMetrics {
        self.core.snapshot()
    }

    async fn list_models(&self) -> AppResult<Vec<ModelInfo>> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .send()
            .await
            .map_err(|e| self.provider_error(e.to_string()))?
            .json::<ModelsResponse>()
            .await
            .map_err(|e| self.provider_error(format!("malformed models response: {}", e)))?;

        Ok(response
            .data
            .into_iter()
            .map(|entry| ModelInfo {
                id: entry.id,
                provider: self.name.clone(),
                context_window: Some(200_000),
            })
            .collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.core.subscribe()
    }

    async fn cleanup(&self) -> AppResult<()> {
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }
}

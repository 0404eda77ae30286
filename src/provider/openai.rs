//! OpenAI backend adapter
//!
//! Drives the OpenAI chat completions API. The base URL is configurable so
//! tests (and OpenAI-compatible gateways) can point it elsewhere.

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

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEGRADED_LATENCY: Duration = Duration::from_secs(10);

/// Cost per million tokens: (prompt, completion)
fn model_rates(model: &str) -> (f64, f64) {
    match model {
        m if m.starts_with("gpt-4o-mini") => (0.15, 0.60),
        m if m.starts_with("gpt-4o") => (2.50, 10.00),
        m if m.starts_with("o3-mini") => (1.10, 4.40),
        // Unknown models priced at the flagship rate so estimates stay
        // conservative rather than optimistic
        _ => (2.50, 10.00),
    }
}

/// Adapter for the OpenAI chat completions API
pub struct OpenAiProvider {
    name: String,
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
    ready: AtomicBool,
    core: AdapterCore,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    model: String,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: String,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

impl OpenAiProvider {
    /// Create an adapter against the default OpenAI endpoint
    pub fn new(name: &str, api_key: &str, default_model: &str) -> AppResult<Self> {
        Self::with_base_url(name, DEFAULT_BASE_URL, api_key, default_model)
    }

    /// Create an adapter against a custom (OpenAI-compatible) endpoint
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

    fn chat_body(&self, prompt: &str, options: &CompletionOptions, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model_for(options),
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "stream": stream,
        })
    }

    fn provider_error(&self, reason: String) -> AppError {
        AppError::ProviderFailed {
            provider: self.name.clone(),
            reason,
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
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
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| self.provider_error(format!("initialization probe failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(
                self.provider_error(format!("initialization probe returned {}", response.status()))
            );
        }

        self.ready.store(true, Ordering::SeqCst);
        tracing::debug!(provider_name = %self.name, "OpenAI adapter initialized");
        Ok(())
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            max_context_window: 128_000,
            supported: HashSet::from([
                Capability::Completion,
                Capability::Chat,
                Capability::Streaming,
                Capability::CodeGeneration,
                Capability::FunctionCalling,
                Capability::VisionInput,
                Capability::Embeddings,
            ]),
        }
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> AppResult<CompletionResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let started = Instant::now();

        let result = async {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&self.chat_body(prompt, options, false))
                .send()
                .await
                .map_err(|e| self.provider_error(e.to_string()))?;

            if !response.status().is_success() {
                return Err(
                    self.provider_error(format!("chat completion returned {}", response.status()))
                );
            }

            response
                .json::<ChatResponse>()
                .await
                .map_err(|e| self.provider_error(format!("malformed chat response: {}", e)))
        }
        .await;

        let latency = started.elapsed();
        self.core.record(latency, result.is_ok());

        let body = result?;
        let text = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| self.provider_error("chat response had no choices".to_string()))?;

        Ok(CompletionResponse {
            text,
            model: body.model,
            prompt_tokens: body.usage.prompt_tokens,
            completion_tokens: body.usage.completion_tokens,
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
        let url = format!("{}/chat/completions", self.base_url);
        let started = Instant::now();
        let model = self.model_for(options);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.chat_body(prompt, options, true))
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
                reason: format!("chat completion returned {}", response.status()),
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
                if data == "[DONE]" {
                    self.core.record(started.elapsed(), true);
                    on_event(StreamEvent::Done {
                        model,
                        completion_tokens,
                    });
                    return Ok(());
                }

                let parsed: StreamChunk = serde_json::from_str(data).map_err(|e| {
                    self.core.record(started.elapsed(), false);
                    AppError::StreamFailed {
                        provider: self.name.clone(),
                        reason: format!("malformed stream chunk: {}", e),
                    }
                })?;

                for choice in parsed.choices {
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() {
                            completion_tokens += 1;
                            on_event(StreamEvent::Token(content));
                        }
                    }
                }
            }
        }

        self.core.record(started.elapsed(), false);
        Err(AppError::StreamFailed {
            provider: self.name.clone(),
            reason: "stream ended before [DONE] marker".to_string(),
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
            .bearer_auth(&self.api_key)
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
                context_window: None,
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

//! Ollama backend adapter
//!
//! Talks to a local Ollama daemon over its native HTTP API. Local inference
//! carries no per-token cost, which makes this adapter the usual winner
//! under the cost strategy.

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

/// Average latency above which the adapter reports itself degraded
const DEGRADED_LATENCY: Duration = Duration::from_secs(5);

/// Adapter for a local Ollama daemon
pub struct OllamaProvider {
    name: String,
    base_url: String,
    default_model: String,
    client: reqwest::Client,
    ready: AtomicBool,
    core: AdapterCore,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

impl OllamaProvider {
    /// Create an adapter; not ready until `initialize` probes the daemon
    pub fn new(name: &str, base_url: &str, default_model: &str) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| AppError::Internal(format!("HTTP client construction: {}", e)))?;

        Ok(Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
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

    fn generate_body(&self, prompt: &str, options: &CompletionOptions, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model_for(options),
            "prompt": prompt,
            "stream": stream,
            "options": {
                "num_predict": options.max_tokens,
                "temperature": options.temperature,
            },
        })
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> AppResult<()> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await.map_err(|e| {
            AppError::ProviderFailed {
                provider: self.name.clone(),
                reason: format!("initialization probe failed: {}", e),
            }
        })?;

        if !response.status().is_success() {
            return Err(AppError::ProviderFailed {
                provider: self.name.clone(),
                reason: format!("initialization probe returned {}", response.status()),
            });
        }

        self.ready.store(true, Ordering::SeqCst);
        tracing::debug!(provider_name = %self.name, "Ollama adapter initialized");
        Ok(())
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            max_context_window: 32_768,
            supported: HashSet::from([
                Capability::Completion,
                Capability::Chat,
                Capability::Streaming,
                Capability::CodeGeneration,
            ]),
        }
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> AppResult<CompletionResponse> {
        let url = format!("{}/api/generate", self.base_url);
        let started = Instant::now();

        let result = async {
            let response = self
                .client
                .post(&url)
                .json(&self.generate_body(prompt, options, false))
                .send()
                .await
                .map_err(|e| AppError::ProviderFailed {
                    provider: self.name.clone(),
                    reason: e.to_string(),
                })?;

            if !response.status().is_success() {
                return Err(AppError::ProviderFailed {
                    provider: self.name.clone(),
                    reason: format!("generate returned {}", response.status()),
                });
            }

            response
                .json::<GenerateResponse>()
                .await
                .map_err(|e| AppError::ProviderFailed {
                    provider: self.name.clone(),
                    reason: format!("malformed generate response: {}", e),
                })
        }
        .await;

        let latency = started.elapsed();
        self.core.record(latency, result.is_ok());

        result.map(|body| CompletionResponse {
            text: body.response,
            model: self.model_for(options),
            prompt_tokens: body.prompt_eval_count,
            completion_tokens: body.eval_count,
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
        let url = format!("{}/api/generate", self.base_url);
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .json(&self.generate_body(prompt, options, true))
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
                reason: format!("generate returned {}", response.status()),
            });
        }

        let mut body = response.bytes_stream();
        let mut lines = LineBuffer::new();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // Caller cancellation is not an adapter failure
                    return Err(AppError::Cancelled);
                }
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
                let parsed: GenerateChunk =
                    serde_json::from_str(&line).map_err(|e| {
                        self.core.record(started.elapsed(), false);
                        AppError::StreamFailed {
                            provider: self.name.clone(),
                            reason: format!("malformed stream chunk: {}", e),
                        }
                    })?;

                if !parsed.response.is_empty() {
                    on_event(StreamEvent::Token(parsed.response));
                }
                if parsed.done {
                    self.core.record(started.elapsed(), true);
                    on_event(StreamEvent::Done {
                        model: self.model_for(options),
                        completion_tokens: parsed.eval_count,
                    });
                    return Ok(());
                }
            }
        }

        self.core.record(started.elapsed(), false);
        Err(AppError::StreamFailed {
            provider: self.name.clone(),
            reason: "stream ended before completion marker".to_string(),
        })
    }

    fn calculate_cost(
        &self,
        _prompt_tokens: u32,
        _completion_tokens: u32,
        _model: Option<&str>,
    ) -> f64 {
        // Self-hosted inference has no per-token cost
        0.0
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
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::ProviderFailed {
                provider: self.name.clone(),
                reason: e.to_string(),
            })?
            .json::<TagsResponse>()
            .await
            .map_err(|e| AppError::ProviderFailed {
                provider: self.name.clone(),
                reason: format!("malformed tags response: {}", e),
            })?;

        Ok(response
            .models
            .into_iter()
            .map(|entry| ModelInfo {
                id: entry.name,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_cost_is_zero() {
        let provider = OllamaProvider::new("local", "http://localhost:11434", "llama3.1:8b")
            .expect("adapter should construct");
        assert_eq!(provider.calculate_cost(1000, 500, None), 0.0);
    }

    #[test]
    fn test_ollama_starts_not_ready() {
        let provider = OllamaProvider::new("local", "http://localhost:11434", "llama3.1:8b")
            .expect("adapter should construct");
        assert!(!provider.is_ready());
    }

    #[test]
    fn test_ollama_capabilities_include_streaming() {
        let provider = OllamaProvider::new("local", "http://localhost:11434", "llama3.1:8b")
            .expect("adapter should construct");
        assert!(
            provider
                .capabilities()
                .supported
                .contains(&Capability::Streaming)
        );
    }

    #[test]
    fn test_ollama_trims_trailing_slash() {
        let provider = OllamaProvider::new("local", "http://localhost:11434/", "llama3.1:8b")
            .expect("adapter should construct");
        assert_eq!(provider.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_ollama_model_override() {
        let provider = OllamaProvider::new("local", "http://localhost:11434", "llama3.1:8b")
            .expect("adapter should construct");
        let options = CompletionOptions {
            model: Some("codellama:13b".to_string()),
            ..Default::default()
        };
        assert_eq!(provider.model_for(&options), "codellama:13b");
        assert_eq!(
            provider.model_for(&CompletionOptions::default()),
            "llama3.1:8b"
        );
    }
}

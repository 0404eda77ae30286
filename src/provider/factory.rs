//! Provider construction from configuration

use super::{Provider, anthropic::AnthropicProvider, ollama::OllamaProvider, openai::OpenAiProvider};
use crate::config::{Config, ProviderConfig, ProviderKind};
use crate::error::{AppError, AppResult};
use std::sync::Arc;

/// Build every enabled provider declared in the configuration
///
/// Disabled entries are skipped with a log line. The returned providers are
/// constructed but not yet initialized; registration drives initialization.
///
/// # Errors
/// Returns a configuration error when an API key environment variable is
/// missing or empty, or when adapter construction fails.
pub fn build_providers(config: &Config) -> AppResult<Vec<Arc<dyn Provider>>> {
    let mut providers: Vec<Arc<dyn Provider>> = Vec::new();

    for entry in &config.providers {
        if !entry.enabled() {
            tracing::info!(
                provider_name = %entry.name(),
                "Skipping disabled provider"
            );
            continue;
        }
        providers.push(build_provider(entry)?);
    }

    Ok(providers)
}

fn build_provider(entry: &ProviderConfig) -> AppResult<Arc<dyn Provider>> {
    match entry.kind() {
        ProviderKind::Ollama => {
            // Presence of base_url is enforced by Config::validate
            let base_url = entry.base_url().ok_or_else(|| {
                AppError::Config(format!("provider '{}' is missing base_url", entry.name()))
            })?;
            Ok(Arc::new(OllamaProvider::new(
                entry.name(),
                base_url,
                entry.default_model(),
            )?))
        }
        ProviderKind::Openai => {
            let api_key = resolve_api_key(entry)?;
            let provider = match entry.base_url() {
                Some(base_url) => OpenAiProvider::with_base_url(
                    entry.name(),
                    base_url,
                    &api_key,
                    entry.default_model(),
                )?,
                None => OpenAiProvider::new(entry.name(), &api_key, entry.default_model())?,
            };
            Ok(Arc::new(provider))
        }
        ProviderKind::Anthropic => {
            let api_key = resolve_api_key(entry)?;
            let provider = match entry.base_url() {
                Some(base_url) => AnthropicProvider::with_base_url(
                    entry.name(),
                    base_url,
                    &api_key,
                    entry.default_model(),
                )?,
                None => AnthropicProvider::new(entry.name(), &api_key, entry.default_model())?,
            };
            Ok(Arc::new(provider))
        }
    }
}

fn resolve_api_key(entry: &ProviderConfig) -> AppResult<String> {
    let var = entry.api_key_env().ok_or_else(|| {
        AppError::Config(format!(
            "provider '{}' is missing api_key_env",
            entry.name()
        ))
    })?;

    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        Ok(_) => Err(AppError::Config(format!(
            "provider '{}': environment variable {} is empty",
            entry.name(),
            var
        ))),
        Err(_) => Err(AppError::Config(format!(
            "provider '{}': environment variable {} is not set",
            entry.name(),
            var
        ))),
    }
}

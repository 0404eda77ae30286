//! Configuration management for Polyroute
//!
//! Parses TOML configuration files and provides typed access to settings.

use crate::error::{AppError, AppResult};
use crate::router::{RouterSettings, Strategy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    /// Backend providers to register at startup
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout() -> u64 {
    30
}

/// Backend kind selecting the adapter implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    Openai,
    Anthropic,
}

/// One backend provider entry
///
/// Fields are private to enforce invariants. Configuration is loaded via
/// deserialization and validated via Config::validate(); after construction
/// the entry cannot be mutated, so validated data stays valid.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    name: String,
    kind: ProviderKind,
    /// Required for ollama; optional endpoint override for hosted backends
    base_url: Option<String>,
    /// Environment variable holding the API key for hosted backends
    api_key_env: Option<String>,
    default_model: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ProviderConfig {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn api_key_env(&self) -> Option<&str> {
        self.api_key_env.as_deref()
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

/// Routing configuration, every knob defaulted
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub default_strategy: Strategy,
    #[serde(default = "default_fallback_enabled")]
    pub fallback_enabled: bool,
    #[serde(default = "default_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
    #[serde(default = "default_breaker_cooldown_ms")]
    pub circuit_breaker_cooldown_ms: u64,
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    #[serde(default = "default_performance_window_ms")]
    pub performance_window_ms: u64,
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: u32,
    #[serde(default = "default_cost_optimization")]
    pub cost_optimization_enabled: bool,
    #[serde(default)]
    pub load_balancing_enabled: bool,
}

fn default_fallback_enabled() -> bool {
    true
}

fn default_breaker_threshold() -> u32 {
    5
}

fn default_breaker_cooldown_ms() -> u64 {
    60_000
}

fn default_health_check_interval_ms() -> u64 {
    30_000
}

fn default_performance_window_ms() -> u64 {
    300_000
}

fn default_quality_threshold() -> u32 {
    70
}

fn default_cost_optimization() -> bool {
    true
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_strategy: Strategy::default(),
            fallback_enabled: default_fallback_enabled(),
            circuit_breaker_threshold: default_breaker_threshold(),
            circuit_breaker_cooldown_ms: default_breaker_cooldown_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
            performance_window_ms: default_performance_window_ms(),
            quality_threshold: default_quality_threshold(),
            cost_optimization_enabled: default_cost_optimization(),
            load_balancing_enabled: false,
        }
    }
}

impl RoutingConfig {
    /// Convert to the router's construction-time settings
    pub fn to_settings(&self) -> RouterSettings {
        RouterSettings {
            default_strategy: self.default_strategy,
            fallback_enabled: self.fallback_enabled,
            circuit_breaker_threshold: self.circuit_breaker_threshold,
            circuit_breaker_cooldown: Duration::from_millis(self.circuit_breaker_cooldown_ms),
            health_check_interval: Duration::from_millis(self.health_check_interval_ms),
            performance_window: Duration::from_millis(self.performance_window_ms),
            quality_threshold: self.quality_threshold,
            cost_optimization_enabled: self.cost_optimization_enabled,
            load_balancing_enabled: self.load_balancing_enabled,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load and validate configuration from a TOML file
    ///
    /// # Errors
    /// Returns a configuration error when the file is unreadable, the TOML
    /// is malformed, or validation fails.
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants deserialization cannot express
    ///
    /// # Errors
    /// - Duplicate provider names (compared case-insensitively)
    /// - Ollama entries without a base_url
    /// - Hosted entries without an api_key_env
    /// - Zero breaker threshold or zero sweep interval
    pub fn validate(&self) -> AppResult<()> {
        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.name.to_lowercase()) {
                return Err(AppError::Config(format!(
                    "duplicate provider name '{}' (names are case-insensitive)",
                    provider.name
                )));
            }

            match provider.kind {
                ProviderKind::Ollama => {
                    if provider.base_url.is_none() {
                        return Err(AppError::Config(format!(
                            "provider '{}': ollama requires base_url",
                            provider.name
                        )));
                    }
                }
                ProviderKind::Openai | ProviderKind::Anthropic => {
                    if provider.api_key_env.is_none() {
                        return Err(AppError::Config(format!(
                            "provider '{}': hosted backends require api_key_env",
                            provider.name
                        )));
                    }
                }
            }
        }

        if self.routing.circuit_breaker_threshold == 0 {
            return Err(AppError::Config(
                "routing.circuit_breaker_threshold must be at least 1".to_string(),
            ));
        }
        if self.routing.health_check_interval_ms == 0 {
            return Err(AppError::Config(
                "routing.health_check_interval_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

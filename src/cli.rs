//! Command-line interface for Polyroute
//!
//! Provides argument parsing and subcommand handling for the Polyroute binary.

use clap::{Parser, Subcommand};

/// Resilient multi-provider router for AI inference backends
#[derive(Parser)]
#[command(name = "polyroute")]
#[command(version)]
#[command(about = "Resilient multi-provider router for AI inference backends")]
#[command(
    long_about = "Polyroute routes inference requests across interchangeable AI backend \
    providers, picking the best target per request by latency, cost, quality, capability, \
    round-robin, or session affinity, with per-provider circuit breakers and fallback."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# Polyroute Configuration
# =======================
#
# This file configures the HTTP server, backend providers, routing strategy,
# and observability settings for Polyroute.

# ─────────────────────────────────────────────────────────────────────────────
# SERVER CONFIGURATION
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"

# Port to listen on
port = 3000

# Request timeout in seconds
request_timeout_seconds = 30

# ─────────────────────────────────────────────────────────────────────────────
# PROVIDERS
# ─────────────────────────────────────────────────────────────────────────────
#
# Each provider entry registers one backend with the router. Names must be
# unique (compared case-insensitively).
#
# Provider fields:
#   - name: Unique provider identity
#   - kind: "ollama", "openai", or "anthropic"
#   - base_url: Required for ollama; optional endpoint override otherwise
#   - api_key_env: Environment variable holding the API key (hosted backends)
#   - default_model: Model used when a request does not specify one
#   - enabled: Set false to keep the entry without registering it

# Local Ollama daemon (no per-token cost)
[[providers]]
name = "local-ollama"
kind = "ollama"
base_url = "http://localhost:11434"
default_model = "llama3.1:8b"

# OpenAI
[[providers]]
name = "openai"
kind = "openai"
api_key_env = "OPENAI_API_KEY"
default_model = "gpt-4o-mini"

# Anthropic
[[providers]]
name = "anthropic"
kind = "anthropic"
api_key_env = "ANTHROPIC_API_KEY"
default_model = "claude-sonnet-4-20250514"

# ─────────────────────────────────────────────────────────────────────────────
# ROUTING CONFIGURATION
# ─────────────────────────────────────────────────────────────────────────────

[routing]
# Selection strategy:
#   - "performance": lowest observed response time
#   - "cost": cheapest estimate for a reference workload
#   - "quality": highest static quality score
#   - "capability": first provider matching the capability filter
#   - "round_robin": rotate through available providers
#   - "sticky": keep a session on the provider that served it last
default_strategy = "performance"

# Try remaining providers in order when the chosen one fails
fallback_enabled = true

# Consecutive failures before a provider's breaker opens
circuit_breaker_threshold = 5

# How long an open breaker waits before a half-open trial (milliseconds)
circuit_breaker_cooldown_ms = 60000

# Health sweep interval (milliseconds)
health_check_interval_ms = 30000

# Rolling window for latency/success samples (milliseconds)
performance_window_ms = 300000

# Minimum quality score applied when a request states no preference
quality_threshold = 70

# Track estimated cost savings in the router metrics
cost_optimization_enabled = true

# Accepted for compatibility; traffic spreading is the round_robin strategy
load_balancing_enabled = false

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
log_level = "info"

# Prometheus metrics are always available at /metrics on the server port
# For production, consider using a reverse proxy to restrict access
"#
}

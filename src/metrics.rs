//! Prometheus metrics collection for Polyroute
//!
//! This module provides operational instrumentation for scraping:
//! - Request counts by provider, strategy, and outcome
//! - Routing decision latency
//! - Fallback attempts by provider
//! - Circuit breaker state transitions
//!
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.
//! The in-process `RouterMetrics` snapshot (`router::aggregate`) is a
//! separate, API-visible view; this module feeds external monitoring only.

use crate::router::breaker::BreakerState;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Outcome label for request counting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    /// Convert outcome to Prometheus label string
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

/// Metrics collector for Polyroute
///
/// Registers all metrics with a private Prometheus registry. Recording
/// failures are logged rather than propagated so instrumentation can never
/// fail a request.
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    requests_total: IntCounterVec,
    routing_duration: HistogramVec,
    fallback_attempts: IntCounterVec,
    breaker_transitions: IntCounterVec,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Counter: completed dispatch attempts by provider, strategy, outcome
        //
        // Cardinality: N providers x 6 strategies x 2 outcomes, bounded by
        // the registered provider count.
        let requests_total = IntCounterVec::new(
            Opts::new(
                "polyroute_requests_total",
                "Total dispatch attempts by provider, strategy, and outcome",
            ),
            &["provider", "strategy", "outcome"],
        )?;

        // Histogram: time from request entry to provider selection
        let routing_duration = HistogramVec::new(
            HistogramOpts::new(
                "polyroute_routing_duration_ms",
                "Routing decision latency in milliseconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 50.0, 100.0]),
            &["strategy"],
        )?;

        // Counter: fallback attempts by the provider that was tried
        let fallback_attempts = IntCounterVec::new(
            Opts::new(
                "polyroute_fallback_attempts_total",
                "Fallback-chain attempts by provider",
            ),
            &["provider"],
        )?;

        // Counter: breaker transitions by provider and destination state
        //
        // An increment with to_state="open" means a provider was just
        // excluded from selection; alerting on it surfaces failing backends.
        let breaker_transitions = IntCounterVec::new(
            Opts::new(
                "polyroute_breaker_transitions_total",
                "Circuit breaker state transitions by provider and destination state",
            ),
            &["provider", "to_state"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(routing_duration.clone()))?;
        registry.register(Box::new(fallback_attempts.clone()))?;
        registry.register(Box::new(breaker_transitions.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            routing_duration,
            fallback_attempts,
            breaker_transitions,
        })
    }

    /// Record one dispatch attempt outcome
    pub fn record_request(&self, provider: &str, strategy: &str, outcome: Outcome) {
        match self
            .requests_total
            .get_metric_with_label_values(&[provider, strategy, outcome.as_str()])
        {
            Ok(counter) => counter.inc(),
            Err(e) => tracing::error!(
                provider_name = %provider,
                error = %e,
                "Failed to record request metric"
            ),
        }
    }

    /// Record the latency of one routing decision
    pub fn record_routing_duration(&self, strategy: &str, millis: f64) {
        match self
            .routing_duration
            .get_metric_with_label_values(&[strategy])
        {
            Ok(histogram) => histogram.observe(millis),
            Err(e) => tracing::error!(
                strategy = %strategy,
                error = %e,
                "Failed to record routing duration metric"
            ),
        }
    }

    /// Record one fallback-chain attempt against a provider
    pub fn record_fallback_attempt(&self, provider: &str) {
        match self
            .fallback_attempts
            .get_metric_with_label_values(&[provider])
        {
            Ok(counter) => counter.inc(),
            Err(e) => tracing::error!(
                provider_name = %provider,
                error = %e,
                "Failed to record fallback metric"
            ),
        }
    }

    /// Record a breaker state transition
    pub fn record_breaker_transition(&self, provider: &str, to_state: BreakerState) {
        match self
            .breaker_transitions
            .get_metric_with_label_values(&[provider, to_state.as_str()])
        {
            Ok(counter) => counter.inc(),
            Err(e) => tracing::error!(
                provider_name = %provider,
                error = %e,
                "Failed to record breaker transition metric"
            ),
        }
    }

    /// Gather all metrics in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or produces invalid UTF-8.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!("metrics output was not valid UTF-8: {}", e))
        })
    }
}

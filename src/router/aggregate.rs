//! Router-level metrics aggregation
//!
//! Process-lifetime counters describing routing behaviour, plus an
//! EMA-smoothed decision-time average. Distinct from the Prometheus
//! instrumentation in `crate::metrics`: this snapshot is part of the
//! router's public API and is reset only when the router is rebuilt.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;

/// Smoothing factor for the decision-time EMA
const DECISION_TIME_ALPHA: f64 = 0.1;

/// Snapshot of router-level counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct RouterMetrics {
    pub total_requests: u64,
    pub successful_routings: u64,
    pub fallbacks_used: u64,
    pub provider_switches: u64,
    /// EMA-smoothed time from request entry to provider selection
    pub average_decision_time_ms: f64,
    /// Accumulated delta between the costliest available estimate and the
    /// chosen provider's estimate, in USD
    pub cost_savings: f64,
    /// Accumulated delta between the slowest and chosen observed latency
    pub performance_gains_ms: f64,
}

#[derive(Default)]
struct Inner {
    metrics: RouterMetrics,
    decision_samples: u64,
    last_provider: Option<String>,
}

/// Aggregator mutated by every routed call
#[derive(Default)]
pub struct MetricsAggregator {
    inner: Mutex<Inner>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a routing attempt entering the dispatcher
    pub async fn record_request(&self) {
        self.inner.lock().await.metrics.total_requests += 1;
    }

    /// Record the time taken to choose a provider, and track switches
    ///
    /// The first sample sets the average directly; later samples fold in
    /// with `avg = alpha * d + (1 - alpha) * avg`.
    pub async fn record_decision(&self, provider_name: &str, decision_time: Duration) {
        let mut inner = self.inner.lock().await;
        let millis = decision_time.as_secs_f64() * 1000.0;

        if inner.decision_samples == 0 {
            inner.metrics.average_decision_time_ms = millis;
        } else {
            inner.metrics.average_decision_time_ms = DECISION_TIME_ALPHA * millis
                + (1.0 - DECISION_TIME_ALPHA) * inner.metrics.average_decision_time_ms;
        }
        inner.decision_samples += 1;

        let switched = inner
            .last_provider
            .as_deref()
            .is_some_and(|previous| !previous.eq_ignore_ascii_case(provider_name));
        if switched {
            inner.metrics.provider_switches += 1;
        }
        inner.last_provider = Some(provider_name.to_string());
    }

    /// Count a routing attempt that returned a completion to the caller
    pub async fn record_successful_routing(&self) {
        self.inner.lock().await.metrics.successful_routings += 1;
    }

    /// Count a call that succeeded via the fallback chain
    pub async fn record_fallback_used(&self) {
        self.inner.lock().await.metrics.fallbacks_used += 1;
    }

    /// Accumulate the cost avoided versus the costliest available estimate
    pub async fn record_cost_saving(&self, saved: f64) {
        if saved > 0.0 {
            self.inner.lock().await.metrics.cost_savings += saved;
        }
    }

    /// Accumulate the latency avoided versus the slowest observed candidate
    pub async fn record_performance_gain(&self, gained: Duration) {
        if gained > Duration::ZERO {
            self.inner.lock().await.metrics.performance_gains_ms +=
                gained.as_secs_f64() * 1000.0;
        }
    }

    /// Current counter snapshot
    pub async fn snapshot(&self) -> RouterMetrics {
        self.inner.lock().await.metrics.clone()
    }
}

//! Routing core for Polyroute
//!
//! The [`ModelRouter`] dispatches completion requests across registered
//! providers: it filters the available set, asks the configured strategy for
//! a primary choice, executes the call, applies the fallback chain on
//! failure, and feeds every outcome back into the per-provider circuit
//! breakers and the router metrics.

pub mod aggregate;
pub mod breaker;
pub mod history;
pub mod registry;
pub mod strategy;

pub use aggregate::{MetricsAggregator, RouterMetrics};
pub use breaker::BreakerState;
pub use registry::{CandidateProvider, ProviderRegistry};
pub use strategy::{RouteContext, Strategy, StrategySelector};

use crate::error::{AppError, AppResult, ProviderFailure};
use crate::metrics::{Metrics, Outcome};
use crate::provider::{
    Capability, CompletionOptions, CompletionResponse, ModelInfo, Provider, ProviderHealth,
    StreamCallback,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Construction-time router configuration, all fields defaulted
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub default_strategy: Strategy,
    pub fallback_enabled: bool,
    /// Consecutive failures that open a provider's breaker
    pub circuit_breaker_threshold: u32,
    /// Time an open breaker waits before the sweep offers a half-open trial
    pub circuit_breaker_cooldown: Duration,
    /// Health sweep tick interval
    pub health_check_interval: Duration,
    /// Rolling window for performance history samples
    pub performance_window: Duration,
    /// Minimum quality score applied when the caller states no preference
    pub quality_threshold: u32,
    /// Gates cost-savings accounting in the router metrics
    pub cost_optimization_enabled: bool,
    /// Accepted for configuration compatibility; selection ordering already
    /// spreads traffic via the round_robin strategy
    pub load_balancing_enabled: bool,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            default_strategy: Strategy::default(),
            fallback_enabled: true,
            circuit_breaker_threshold: 5,
            circuit_breaker_cooldown: Duration::from_secs(60),
            health_check_interval: Duration::from_secs(30),
            performance_window: Duration::from_secs(300),
            quality_threshold: 70,
            cost_optimization_enabled: true,
            load_balancing_enabled: false,
        }
    }
}

/// Result of a routing decision, produced per call and never persisted
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub provider: String,
    pub reasoning: String,
    pub confidence: f64,
    /// Remaining available providers in registration order, unranked
    pub fallback_providers: Vec<String>,
    /// Cost estimate for the reference workload in USD
    pub estimated_cost: f64,
    /// Last observed latency of the chosen provider, if any
    #[serde(skip)]
    pub estimated_response_time: Option<Duration>,
}

/// Per-provider status row returned by `get_provider_status`
#[derive(Serialize)]
pub struct ProviderStatus {
    pub health: ProviderHealth,
    pub breaker_state: BreakerState,
    /// Success fraction over the performance window
    pub success_rate: f64,
    pub total_requests: u64,
    pub capabilities: Vec<Capability>,
}

/// Shared router instance dispatching requests across providers
///
/// All mutable state lives behind fine-grained per-provider locks in the
/// registry; provider completion calls execute with no router lock held, so
/// concurrent `route` calls only serialize on the brief state updates.
pub struct ModelRouter {
    settings: RouterSettings,
    registry: Arc<ProviderRegistry>,
    selector: StrategySelector,
    aggregate: MetricsAggregator,
    metrics: Arc<Metrics>,
    sweep_cancel: CancellationToken,
    sweep_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ModelRouter {
    /// Create a router and start its health sweep
    ///
    /// Must be called from within a Tokio runtime; the sweep task is spawned
    /// immediately and runs until `cleanup`.
    ///
    /// # Errors
    /// Returns an error if Prometheus metric registration fails.
    pub fn new(settings: RouterSettings) -> AppResult<Self> {
        let metrics = Arc::new(
            Metrics::new().map_err(|e| AppError::Internal(format!("metrics init: {}", e)))?,
        );
        let registry = Arc::new(ProviderRegistry::new(&settings, metrics.clone()));

        let sweep_cancel = CancellationToken::new();
        let sweep = spawn_health_sweep(
            registry.clone(),
            settings.health_check_interval,
            sweep_cancel.clone(),
        );

        Ok(Self {
            settings,
            registry,
            selector: StrategySelector::new(),
            aggregate: MetricsAggregator::new(),
            metrics,
            sweep_cancel,
            sweep_handle: Mutex::new(Some(sweep)),
        })
    }

    /// Register a provider with the router
    pub async fn register_provider(&self, provider: Arc<dyn Provider>) -> AppResult<()> {
        self.registry.register(provider).await
    }

    /// Unregister a provider; unknown names are a no-op
    pub async fn unregister_provider(&self, name: &str) {
        self.registry.unregister(name).await;
    }

    /// Route a completion request to the best provider, with fallback
    pub async fn route(
        &self,
        prompt: &str,
        options: &CompletionOptions,
        context: &RouteContext,
    ) -> AppResult<CompletionResponse> {
        let started = Instant::now();
        self.aggregate.record_request().await;

        let candidates = self
            .registry
            .list_available(&context.required_capabilities)
            .await;
        let (selection_index, decision) = self.decide(started, &candidates, context).await?;

        let strategy = self.settings.default_strategy.as_str();
        let primary = &candidates[selection_index];

        match primary.provider.complete(prompt, options).await {
            Ok(response) => {
                self.registry.record_success(primary.name()).await;
                self.metrics
                    .record_request(primary.name(), strategy, Outcome::Success);
                self.record_optimization_gains(&candidates, selection_index)
                    .await;
                self.aggregate.record_successful_routing().await;
                Ok(response)
            }
            Err(primary_error) => {
                self.registry.record_failure(primary.name()).await;
                self.metrics
                    .record_request(primary.name(), strategy, Outcome::Failure);
                tracing::warn!(
                    provider_name = %primary.name(),
                    error = %primary_error,
                    fallbacks = decision.fallback_providers.len(),
                    "Primary provider failed"
                );

                let mut failures = vec![ProviderFailure {
                    provider: primary.name().to_string(),
                    reason: primary_error.to_string(),
                }];

                if self.settings.fallback_enabled {
                    if let Some(response) = self
                        .try_fallbacks(prompt, options, &candidates, selection_index, &mut failures)
                        .await
                    {
                        self.aggregate.record_fallback_used().await;
                        self.aggregate.record_successful_routing().await;
                        return Ok(response);
                    }
                }

                Err(AppError::AllProvidersFailed { failures })
            }
        }
    }

    /// Route a streaming completion
    ///
    /// Adds `streaming` to the required capabilities and never falls back:
    /// resuming a partially-delivered stream on another provider is out of
    /// scope, so any failure surfaces directly. Cancellation propagates to
    /// the caller without counting as a provider failure.
    pub async fn route_stream(
        &self,
        prompt: &str,
        options: &CompletionOptions,
        on_event: StreamCallback,
        context: &RouteContext,
        cancel: CancellationToken,
    ) -> AppResult<()> {
        let started = Instant::now();
        self.aggregate.record_request().await;

        let mut required = context.required_capabilities.clone();
        required.insert(Capability::Streaming);
        let candidates = self.registry.list_available(&required).await;
        if candidates.is_empty() {
            let mut names: Vec<&'static str> = required.iter().map(Capability::as_str).collect();
            names.sort_unstable();
            return Err(AppError::no_providers(names));
        }
        let (selection_index, _decision) = self.decide(started, &candidates, context).await?;

        let strategy = self.settings.default_strategy.as_str();
        let primary = &candidates[selection_index];

        match primary
            .provider
            .complete_stream(prompt, options, on_event, cancel.clone())
            .await
        {
            Ok(()) => {
                self.registry.record_success(primary.name()).await;
                self.metrics
                    .record_request(primary.name(), strategy, Outcome::Success);
                self.aggregate.record_successful_routing().await;
                Ok(())
            }
            Err(e) if e.is_cancellation() || cancel.is_cancelled() => {
                tracing::debug!(
                    provider_name = %primary.name(),
                    "Stream cancelled by caller"
                );
                Err(AppError::Cancelled)
            }
            Err(e) => {
                self.registry.record_failure(primary.name()).await;
                self.metrics
                    .record_request(primary.name(), strategy, Outcome::Failure);
                Err(e)
            }
        }
    }

    /// The provider the configured strategy would pick right now
    pub async fn get_best_provider(&self, context: &RouteContext) -> Option<Arc<dyn Provider>> {
        let candidates = self
            .registry
            .list_available(&context.required_capabilities)
            .await;
        if candidates.is_empty() {
            return None;
        }
        let selection = self
            .selector
            .select(
                self.settings.default_strategy,
                &candidates,
                &self.effective_context(context),
            )
            .await;
        Some(candidates[selection.index].provider.clone())
    }

    /// Aggregate the model lists of every ready provider
    ///
    /// Providers that error are skipped and logged rather than failing the
    /// whole aggregation.
    pub async fn get_all_models(&self) -> Vec<ModelInfo> {
        let mut models = Vec::new();
        for entry in self.registry.snapshot().await {
            if !entry.provider.is_ready() {
                continue;
            }
            match entry.provider.list_models().await {
                Ok(mut list) => models.append(&mut list),
                Err(e) => tracing::warn!(
                    provider_name = %entry.provider.name(),
                    error = %e,
                    "Skipping provider that failed to list models"
                ),
            }
        }
        models
    }

    /// Snapshot of the router-level counters
    pub async fn get_metrics(&self) -> RouterMetrics {
        self.aggregate.snapshot().await
    }

    /// Per-provider health, breaker, and traffic summary
    pub async fn get_provider_status(&self) -> HashMap<String, ProviderStatus> {
        let mut status = HashMap::new();
        for entry in self.registry.snapshot().await {
            let health = entry.provider.health().await;
            let provider_metrics = entry.provider.metrics();
            let mut capabilities: Vec<Capability> = entry
                .provider
                .capabilities()
                .supported
                .into_iter()
                .collect();
            capabilities.sort_by_key(|c| c.as_str());

            status.insert(
                entry.provider.name().to_string(),
                ProviderStatus {
                    health,
                    breaker_state: entry.breaker_state,
                    success_rate: entry.windowed_success_rate,
                    total_requests: provider_metrics.total_requests,
                    capabilities,
                },
            );
        }
        status
    }

    /// Breaker state for one provider, if registered
    pub async fn breaker_state(&self, name: &str) -> Option<BreakerState> {
        self.registry.breaker_state(name).await
    }

    /// Prometheus instrumentation handle, for the `/metrics` endpoint
    pub fn prometheus(&self) -> &Metrics {
        &self.metrics
    }

    /// Stop the health sweep, clean up every provider, clear all state
    pub async fn cleanup(&self) {
        self.sweep_cancel.cancel();
        if let Some(handle) = self.sweep_handle.lock().await.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "Health sweep task ended abnormally");
                }
            }
        }
        self.registry.clear().await;
        tracing::info!("Router cleaned up");
    }

    /// Resolve the decision for a non-empty candidate list
    async fn decide(
        &self,
        started: Instant,
        candidates: &[CandidateProvider],
        context: &RouteContext,
    ) -> AppResult<(usize, RoutingDecision)> {
        if candidates.is_empty() {
            let mut required: Vec<&'static str> = context
                .required_capabilities
                .iter()
                .map(Capability::as_str)
                .collect();
            required.sort_unstable();
            return Err(AppError::no_providers(required));
        }

        let strategy = self.settings.default_strategy;
        let selection = self
            .selector
            .select(strategy, candidates, &self.effective_context(context))
            .await;

        let chosen = &candidates[selection.index];
        let decision = RoutingDecision {
            provider: chosen.name().to_string(),
            reasoning: selection.reasoning,
            confidence: selection.confidence,
            fallback_providers: candidates
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != selection.index)
                .map(|(_, c)| c.name().to_string())
                .collect(),
            estimated_cost: strategy::reference_cost(chosen),
            estimated_response_time: chosen.last_response_time,
        };

        let decision_time = started.elapsed();
        self.aggregate
            .record_decision(&decision.provider, decision_time)
            .await;
        self.metrics.record_routing_duration(
            strategy.as_str(),
            decision_time.as_secs_f64() * 1000.0,
        );

        tracing::debug!(
            provider_name = %decision.provider,
            strategy = strategy.as_str(),
            confidence = decision.confidence,
            reasoning = %decision.reasoning,
            "Routing decision"
        );

        Ok((selection.index, decision))
    }

    /// Try each fallback in registration order; first success wins
    async fn try_fallbacks(
        &self,
        prompt: &str,
        options: &CompletionOptions,
        candidates: &[CandidateProvider],
        primary_index: usize,
        failures: &mut Vec<ProviderFailure>,
    ) -> Option<CompletionResponse> {
        let strategy = self.settings.default_strategy.as_str();

        for (index, candidate) in candidates.iter().enumerate() {
            if index == primary_index {
                continue;
            }
            self.metrics.record_fallback_attempt(candidate.name());

            match candidate.provider.complete(prompt, options).await {
                Ok(response) => {
                    self.registry.record_success(candidate.name()).await;
                    self.metrics
                        .record_request(candidate.name(), strategy, Outcome::Success);
                    tracing::info!(
                        provider_name = %candidate.name(),
                        attempts = failures.len() + 1,
                        "Fallback provider succeeded"
                    );
                    return Some(response);
                }
                Err(e) => {
                    self.registry.record_failure(candidate.name()).await;
                    self.metrics
                        .record_request(candidate.name(), strategy, Outcome::Failure);
                    failures.push(ProviderFailure {
                        provider: candidate.name().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        None
    }

    /// Accumulate what the decision saved versus the worst available option
    async fn record_optimization_gains(
        &self,
        candidates: &[CandidateProvider],
        chosen_index: usize,
    ) {
        if self.settings.cost_optimization_enabled {
            let chosen_cost = strategy::reference_cost(&candidates[chosen_index]);
            let costliest = candidates
                .iter()
                .map(strategy::reference_cost)
                .fold(chosen_cost, f64::max);
            self.aggregate
                .record_cost_saving(costliest - chosen_cost)
                .await;
        }

        if let Some(chosen_time) = candidates[chosen_index].last_response_time {
            let slowest = candidates
                .iter()
                .filter_map(|c| c.last_response_time)
                .fold(chosen_time, Duration::max);
            self.aggregate
                .record_performance_gain(slowest.saturating_sub(chosen_time))
                .await;
        }
    }

    /// Fill in the configured quality floor when the caller states none
    fn effective_context(&self, context: &RouteContext) -> RouteContext {
        let mut context = context.clone();
        if context.quality_preference.is_none() {
            context.quality_preference = Some(self.settings.quality_threshold);
        }
        context
    }
}

/// Periodic task aging open breakers toward half-open
///
/// Runs on its own schedule, touching breaker state only, and stops when
/// the router's cancellation token fires.
fn spawn_health_sweep(
    registry: Arc<ProviderRegistry>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!(interval_ms = interval.as_millis() as u64, "Health sweep started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    registry.sweep_open_breakers().await;
                }
            }
        }
        tracing::debug!("Health sweep stopped");
    })
}

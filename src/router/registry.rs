//! Provider registry
//!
//! Owns the registered provider handles together with their circuit breakers
//! and performance histories behind one API, so the one-breaker-per-provider
//! invariant is structural: an entry's breaker and history are created with
//! the provider and deleted with it, never orphaned.

use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::provider::{Capability, Provider, ProviderEvent};
use crate::router::RouterSettings;
use crate::router::breaker::{BreakerState, CircuitBreaker};
use crate::router::history::{PerformanceHistory, PerformanceSample};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;

/// A provider eligible for selection, with the state strategies consume
///
/// Candidates are produced in registration order, so "ties broken by
/// registration order" falls out of first-match scans over the list.
#[derive(Clone)]
pub struct CandidateProvider {
    pub provider: Arc<dyn Provider>,
    /// Monotonic registration sequence number
    pub registered: u64,
    /// Most recent windowed latency observation, if any
    pub last_response_time: Option<Duration>,
}

impl CandidateProvider {
    /// Provider name shorthand
    pub fn name(&self) -> &str {
        self.provider.name()
    }
}

/// Point-in-time view of one registry entry, for status reporting
pub struct EntrySnapshot {
    pub provider: Arc<dyn Provider>,
    pub breaker_state: BreakerState,
    pub windowed_success_rate: f64,
}

/// One registered provider with its breaker and history
///
/// The per-entry locks keep unrelated providers' traffic from serializing
/// on a single registry-wide lock.
struct ProviderEntry {
    provider: Arc<dyn Provider>,
    seq: u64,
    breaker: Mutex<CircuitBreaker>,
    history: Mutex<PerformanceHistory>,
    event_pump: Mutex<Option<JoinHandle<()>>>,
}

/// Registry of backend providers keyed by lower-cased name
pub struct ProviderRegistry {
    entries: RwLock<HashMap<String, Arc<ProviderEntry>>>,
    next_seq: AtomicU64,
    breaker_threshold: u32,
    breaker_cooldown: Duration,
    performance_window: Duration,
    metrics: Arc<Metrics>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new(settings: &RouterSettings, metrics: Arc<Metrics>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            breaker_threshold: settings.circuit_breaker_threshold,
            breaker_cooldown: settings.circuit_breaker_cooldown,
            performance_window: settings.performance_window,
            metrics,
        }
    }

    /// Register a provider
    ///
    /// Initializes the provider, creates its breaker (starting `Closed`) and
    /// empty history, and starts consuming its health/metrics events.
    ///
    /// # Errors
    /// Returns a validation error if a provider with the same name (compared
    /// case-insensitively) is already registered, or the provider's own
    /// initialization error.
    pub async fn register(&self, provider: Arc<dyn Provider>) -> AppResult<()> {
        let key = provider.name().to_lowercase();

        if self.entries.read().await.contains_key(&key) {
            return Err(AppError::Validation(format!(
                "Provider '{}' is already registered",
                provider.name()
            )));
        }

        provider.initialize().await?;

        let entry = Arc::new(ProviderEntry {
            provider: provider.clone(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            breaker: Mutex::new(CircuitBreaker::new(
                self.breaker_threshold,
                self.breaker_cooldown,
            )),
            history: Mutex::new(PerformanceHistory::new(self.performance_window)),
            event_pump: Mutex::new(None),
        });

        {
            let mut entries = self.entries.write().await;
            // Re-check under the write lock: a concurrent register for the
            // same name may have won while we were initializing.
            if entries.contains_key(&key) {
                return Err(AppError::Validation(format!(
                    "Provider '{}' is already registered",
                    provider.name()
                )));
            }
            entries.insert(key.clone(), entry.clone());
        }

        let pump = spawn_event_pump(entry.clone(), self.metrics.clone());
        *entry.event_pump.lock().await = Some(pump);

        tracing::info!(
            provider_name = %provider.name(),
            "Provider registered"
        );
        Ok(())
    }

    /// Unregister a provider by name
    ///
    /// Removes the entry, breaker, and history together, stops the event
    /// pump, and invokes the provider's cleanup. Unknown names are a no-op.
    pub async fn unregister(&self, name: &str) {
        let key = name.to_lowercase();
        let removed = self.entries.write().await.remove(&key);

        let Some(entry) = removed else {
            tracing::debug!(
                provider_name = %name,
                "Unregister for unknown provider ignored"
            );
            return;
        };

        if let Some(pump) = entry.event_pump.lock().await.take() {
            pump.abort();
        }

        if let Err(e) = entry.provider.cleanup().await {
            tracing::warn!(
                provider_name = %name,
                error = %e,
                "Provider cleanup failed during unregister"
            );
        }

        tracing::info!(provider_name = %name, "Provider unregistered");
    }

    /// Providers eligible for a request, in registration order
    ///
    /// A provider qualifies when it reports ready, its breaker is not open,
    /// and its advertised capabilities cover the required set.
    pub async fn list_available(
        &self,
        required: &HashSet<Capability>,
    ) -> Vec<CandidateProvider> {
        let entries = self.entries.read().await;
        let mut candidates = Vec::new();

        for entry in entries.values() {
            if !entry.provider.is_ready() {
                continue;
            }
            if entry.breaker.lock().await.is_open() {
                continue;
            }
            if !entry.provider.capabilities().satisfies(required) {
                continue;
            }
            let last_response_time = entry.history.lock().await.last_response_time();
            candidates.push(CandidateProvider {
                provider: entry.provider.clone(),
                registered: entry.seq,
                last_response_time,
            });
        }

        candidates.sort_by_key(|c| c.registered);
        candidates
    }

    /// Feed a success signal into a provider's breaker
    pub async fn record_success(&self, name: &str) {
        if let Some(entry) = self.entry(name).await {
            apply_breaker_signal(&entry, &self.metrics, true).await;
        }
    }

    /// Feed a failure signal into a provider's breaker
    pub async fn record_failure(&self, name: &str) {
        if let Some(entry) = self.entry(name).await {
            apply_breaker_signal(&entry, &self.metrics, false).await;
        }
    }

    /// Age open breakers toward half-open; one health-sweep tick
    pub async fn sweep_open_breakers(&self) {
        let entries: Vec<Arc<ProviderEntry>> =
            self.entries.read().await.values().cloned().collect();
        let now = Instant::now();

        for entry in entries {
            let mut breaker = entry.breaker.lock().await;
            if breaker.try_half_open(now) {
                tracing::info!(
                    provider_name = %entry.provider.name(),
                    "Breaker cooldown elapsed, entering half-open trial"
                );
                self.metrics
                    .record_breaker_transition(entry.provider.name(), BreakerState::HalfOpen);
            }
        }
    }

    /// Current breaker state for a provider, if registered
    pub async fn breaker_state(&self, name: &str) -> Option<BreakerState> {
        let entry = self.entry(name).await?;
        let state = entry.breaker.lock().await.state();
        Some(state)
    }

    /// Snapshot of every entry for status reporting
    pub async fn snapshot(&self) -> Vec<EntrySnapshot> {
        let entries: Vec<Arc<ProviderEntry>> =
            self.entries.read().await.values().cloned().collect();
        let mut snapshots = Vec::with_capacity(entries.len());

        for entry in entries {
            let breaker_state = entry.breaker.lock().await.state();
            let windowed_success_rate = entry.history.lock().await.success_rate();
            snapshots.push(EntrySnapshot {
                provider: entry.provider.clone(),
                breaker_state,
                windowed_success_rate,
            });
        }
        snapshots
    }

    /// Number of registered providers
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True when nothing is registered
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Remove every provider: stop pumps, run cleanups, drop all state
    pub async fn clear(&self) {
        let drained: Vec<(String, Arc<ProviderEntry>)> =
            self.entries.write().await.drain().collect();

        for (name, entry) in drained {
            if let Some(pump) = entry.event_pump.lock().await.take() {
                pump.abort();
            }
            if let Err(e) = entry.provider.cleanup().await {
                tracing::warn!(
                    provider_name = %name,
                    error = %e,
                    "Provider cleanup failed during registry clear"
                );
            }
        }
    }

    async fn entry(&self, name: &str) -> Option<Arc<ProviderEntry>> {
        self.entries.read().await.get(&name.to_lowercase()).cloned()
    }
}

/// Apply one success-or-failure signal, logging and counting transitions
async fn apply_breaker_signal(entry: &ProviderEntry, metrics: &Metrics, success: bool) {
    let mut breaker = entry.breaker.lock().await;
    let before = breaker.state();
    if success {
        breaker.record_success();
    } else {
        breaker.record_failure(Instant::now());
    }
    let after = breaker.state();

    if before != after {
        match after {
            BreakerState::Open => tracing::warn!(
                provider_name = %entry.provider.name(),
                from = before.as_str(),
                "Breaker opened, provider excluded from selection"
            ),
            _ => tracing::info!(
                provider_name = %entry.provider.name(),
                from = before.as_str(),
                to = after.as_str(),
                "Breaker state transition"
            ),
        }
        metrics.record_breaker_transition(entry.provider.name(), after);
    }
}

/// Consume a provider's event stream for the lifetime of its registration
///
/// Each health or metrics event feeds exactly one signal into the breaker;
/// metrics events additionally append a performance history sample derived
/// from the provider's aggregate snapshot.
fn spawn_event_pump(entry: Arc<ProviderEntry>, metrics: Arc<Metrics>) -> JoinHandle<()> {
    // Subscribe before spawning so no event published after registration
    // returns can slip past the pump.
    let mut events = entry.provider.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ProviderEvent::HealthUpdated(health)) => {
                    let success =
                        health.status != crate::provider::HealthStatus::Unhealthy;
                    apply_breaker_signal(&entry, &metrics, success).await;
                }
                Ok(ProviderEvent::MetricsUpdated(snapshot)) => {
                    let success =
                        snapshot.total_requests == 0 || snapshot.success_rate() >= 0.5;
                    entry.history.lock().await.record(PerformanceSample {
                        timestamp: Instant::now(),
                        response_time: snapshot.average_response_time,
                        success,
                    });
                    apply_breaker_signal(&entry, &metrics, success).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        provider_name = %entry.provider.name(),
                        skipped,
                        "Provider event pump lagged, events dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

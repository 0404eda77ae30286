//! Routing strategies
//!
//! Each strategy is a deterministic decision function over the currently
//! available providers and optional request context. Strategies pick the
//! primary provider only; the fallback list is always the remaining
//! available providers in registration order, unranked.

use crate::provider::Capability;
use crate::router::registry::CandidateProvider;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Confidence vocabulary shared by all strategies
pub const CONFIDENCE_LOW: f64 = 0.6;
pub const CONFIDENCE_MEDIUM: f64 = 0.7;
pub const CONFIDENCE_HIGH: f64 = 0.8;
pub const CONFIDENCE_VERY_HIGH: f64 = 0.9;

/// Reference workload used for cost comparisons between providers
pub const REFERENCE_PROMPT_TOKENS: u32 = 1000;
pub const REFERENCE_COMPLETION_TOKENS: u32 = 500;

/// Quality score assumed for providers missing from the lookup table
const DEFAULT_QUALITY_SCORE: u32 = 70;

/// Selection strategy for choosing the primary provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Minimum last-observed response time
    #[default]
    Performance,
    /// Minimum estimated cost for the reference workload
    Cost,
    /// Highest static quality score
    Quality,
    /// First provider satisfying the capability filter
    Capability,
    /// Rotate through available providers in registration order
    RoundRobin,
    /// Reuse the provider previously chosen for the same session
    Sticky,
}

impl Strategy {
    /// Convert to string representation for logging and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Performance => "performance",
            Self::Cost => "cost",
            Self::Quality => "quality",
            Self::Capability => "capability",
            Self::RoundRobin => "round_robin",
            Self::Sticky => "sticky",
        }
    }
}

/// Per-request routing context supplied by the caller
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteContext {
    /// Session identity for sticky routing
    pub session_id: Option<String>,
    /// Capabilities the chosen provider must advertise
    #[serde(default)]
    pub required_capabilities: HashSet<Capability>,
    /// Cost ceiling in USD for the reference workload
    pub max_cost: Option<f64>,
    /// Minimum acceptable quality score
    pub quality_preference: Option<u32>,
}

/// Outcome of a strategy decision: an index into the candidate list
#[derive(Debug, Clone)]
pub struct Selection {
    pub index: usize,
    pub reasoning: String,
    pub confidence: f64,
}

/// Static quality score lookup
///
/// Unknown provider names score the default so they remain selectable but
/// never beat a curated entry.
fn quality_score(provider_name: &str) -> u32 {
    match provider_name.to_lowercase().as_str() {
        "anthropic" => 92,
        "openai" => 90,
        "ollama" => 75,
        _ => DEFAULT_QUALITY_SCORE,
    }
}

/// Strategy selector holding the little state some strategies need
///
/// The round-robin counter and session map are the only mutable pieces;
/// every decision is otherwise a pure function of its inputs.
pub struct StrategySelector {
    round_robin: AtomicUsize,
    sessions: RwLock<HashMap<String, String>>,
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategySelector {
    /// Create a selector with a fresh round-robin counter and session map
    pub fn new() -> Self {
        Self {
            round_robin: AtomicUsize::new(0),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Pick the primary provider from a non-empty candidate list
    ///
    /// Candidates must be in registration order (as produced by the
    /// registry), which makes first-match scans break ties correctly.
    pub async fn select(
        &self,
        strategy: Strategy,
        candidates: &[CandidateProvider],
        context: &RouteContext,
    ) -> Selection {
        debug_assert!(!candidates.is_empty());

        match strategy {
            Strategy::Performance => select_performance(candidates),
            Strategy::Cost => select_cost(candidates, context),
            Strategy::Quality => select_quality(candidates, context),
            Strategy::Capability => Selection {
                index: 0,
                reasoning: format!(
                    "First of {} providers matching the capability filter",
                    candidates.len()
                ),
                confidence: CONFIDENCE_MEDIUM,
            },
            Strategy::RoundRobin => {
                let position = self.round_robin.fetch_add(1, Ordering::Relaxed);
                let index = position % candidates.len();
                Selection {
                    index,
                    reasoning: format!(
                        "Round-robin position {} of {}",
                        index + 1,
                        candidates.len()
                    ),
                    confidence: CONFIDENCE_MEDIUM,
                }
            }
            Strategy::Sticky => self.select_sticky(candidates, context).await,
        }
    }

    async fn select_sticky(
        &self,
        candidates: &[CandidateProvider],
        context: &RouteContext,
    ) -> Selection {
        let Some(session_id) = context.session_id.as_deref() else {
            return Selection {
                index: 0,
                reasoning: "No session id supplied, using first available provider".to_string(),
                confidence: CONFIDENCE_LOW,
            };
        };

        if let Some(previous) = self.sessions.read().await.get(session_id) {
            if let Some(index) = candidates
                .iter()
                .position(|c| c.name().eq_ignore_ascii_case(previous))
            {
                return Selection {
                    index,
                    reasoning: format!(
                        "Session {} pinned to provider {}",
                        session_id,
                        candidates[index].name()
                    ),
                    confidence: CONFIDENCE_VERY_HIGH,
                };
            }
        }

        // Prior provider gone or never mapped: take the first available and
        // remember the new mapping.
        let chosen = candidates[0].name().to_string();
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), chosen.clone());
        Selection {
            index: 0,
            reasoning: format!("Session {} newly mapped to provider {}", session_id, chosen),
            confidence: CONFIDENCE_MEDIUM,
        }
    }
}

fn select_performance(candidates: &[CandidateProvider]) -> Selection {
    let mut best = 0;
    let mut best_time = candidates[0]
        .last_response_time
        .unwrap_or(Duration::MAX);

    for (index, candidate) in candidates.iter().enumerate().skip(1) {
        let time = candidate.last_response_time.unwrap_or(Duration::MAX);
        // Strict comparison keeps the earliest-registered candidate on ties
        if time < best_time {
            best = index;
            best_time = time;
        }
    }

    match candidates[best].last_response_time {
        Some(observed) => Selection {
            index: best,
            reasoning: format!(
                "Lowest observed response time ({}ms)",
                observed.as_millis()
            ),
            confidence: CONFIDENCE_HIGH,
        },
        None => Selection {
            index: best,
            reasoning: "No latency observations yet, using registration order".to_string(),
            confidence: CONFIDENCE_LOW,
        },
    }
}

fn select_cost(candidates: &[CandidateProvider], context: &RouteContext) -> Selection {
    let mut best = 0;
    let mut best_cost = reference_cost(&candidates[0]);

    for (index, candidate) in candidates.iter().enumerate().skip(1) {
        let cost = reference_cost(candidate);
        if cost < best_cost {
            best = index;
            best_cost = cost;
        }
    }

    if let Some(ceiling) = context.max_cost {
        if best_cost > ceiling {
            return Selection {
                index: best,
                reasoning: format!(
                    "Cheapest estimate ${:.4} exceeds the requested ceiling ${:.4}",
                    best_cost, ceiling
                ),
                confidence: CONFIDENCE_LOW,
            };
        }
    }

    Selection {
        index: best,
        reasoning: format!("Lowest estimated cost (${:.4})", best_cost),
        confidence: CONFIDENCE_HIGH,
    }
}

fn select_quality(candidates: &[CandidateProvider], context: &RouteContext) -> Selection {
    let mut best = 0;
    let mut best_score = quality_score(candidates[0].name());

    for (index, candidate) in candidates.iter().enumerate().skip(1) {
        let score = quality_score(candidate.name());
        if score > best_score {
            best = index;
            best_score = score;
        }
    }

    let confidence = match context.quality_preference {
        Some(minimum) if best_score < minimum => CONFIDENCE_LOW,
        _ => CONFIDENCE_HIGH,
    };

    Selection {
        index: best,
        reasoning: format!("Highest quality score ({})", best_score),
        confidence,
    }
}

/// Cost estimate for the fixed reference workload
pub fn reference_cost(candidate: &CandidateProvider) -> f64 {
    candidate.provider.calculate_cost(
        REFERENCE_PROMPT_TOKENS,
        REFERENCE_COMPLETION_TOKENS,
        None,
    )
}

//! Per-provider circuit breaker
//!
//! Tracks success/failure signals for a single provider and temporarily
//! excludes repeatedly-failing providers from selection. State transitions:
//!
//! - `Closed -> Open`: failure count reaches the configured threshold
//! - `Open -> HalfOpen`: only via the health sweep, once the cooldown elapses
//! - `HalfOpen -> Closed`: 3 consecutive successes
//! - `HalfOpen -> Open`: any failure, cooldown restarts
//!
//! Counters reset on every state transition.

use serde::Serialize;
use std::time::{Duration, Instant};

/// Consecutive successes required to close a half-open breaker
const HALF_OPEN_SUCCESS_THRESHOLD: u32 = 3;

/// Breaker state for a single provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Normal operation, provider eligible for selection
    Closed,
    /// Provider excluded from selection until the cooldown elapses
    Open,
    /// Trial state, a few requests probe whether the provider recovered
    HalfOpen,
}

impl BreakerState {
    /// Convert to string representation for logging and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker for one provider
///
/// All fields are private so transitions can only happen through the signal
/// methods, keeping the state machine invariants intact.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: BreakerState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    /// Create a new breaker in `Closed` state
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            success_count: 0,
            opened_at: None,
            failure_threshold,
            cooldown,
        }
    }

    /// Current state
    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// True when the provider must be excluded from selection
    pub fn is_open(&self) -> bool {
        self.state == BreakerState::Open
    }

    /// Consecutive failure count since the last transition
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Consecutive success count since the last transition
    pub fn success_count(&self) -> u32 {
        self.success_count
    }

    /// Record a success signal
    ///
    /// In `HalfOpen`, 3 consecutive successes close the breaker. In `Closed`,
    /// a success clears accumulated failures. Successes while `Open` are
    /// ignored (none should occur, since open providers are not selected).
    pub fn record_success(&mut self) {
        match self.state {
            BreakerState::Closed => {
                self.failure_count = 0;
                self.success_count += 1;
            }
            BreakerState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= HALF_OPEN_SUCCESS_THRESHOLD {
                    self.transition(BreakerState::Closed);
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Record a failure signal
    ///
    /// In `Closed`, reaching the failure threshold opens the breaker. In
    /// `HalfOpen`, a single failure re-opens it and restarts the cooldown.
    pub fn record_failure(&mut self, now: Instant) {
        match self.state {
            BreakerState::Closed => {
                self.failure_count += 1;
                self.success_count = 0;
                if self.failure_count >= self.failure_threshold {
                    self.transition(BreakerState::Open);
                    self.opened_at = Some(now);
                }
            }
            BreakerState::HalfOpen => {
                self.transition(BreakerState::Open);
                self.opened_at = Some(now);
            }
            BreakerState::Open => {}
        }
    }

    /// Move `Open -> HalfOpen` if the cooldown has elapsed
    ///
    /// Called only by the health sweep. Returns true when a transition
    /// happened so the caller can log it.
    pub fn try_half_open(&mut self, now: Instant) -> bool {
        if self.state != BreakerState::Open {
            return false;
        }
        let elapsed = self
            .opened_at
            .map(|opened| now.duration_since(opened))
            .unwrap_or(Duration::ZERO);
        if elapsed >= self.cooldown {
            self.transition(BreakerState::HalfOpen);
            true
        } else {
            false
        }
    }

    /// Apply a transition, resetting both counters
    fn transition(&mut self, next: BreakerState) {
        self.state = next;
        self.failure_count = 0;
        self.success_count = 0;
        if next != BreakerState::Open {
            self.opened_at = None;
        }
    }
}

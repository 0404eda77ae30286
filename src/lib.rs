//! Polyroute - Resilient multi-provider router for AI inference backends
//!
//! This library routes inference requests across interchangeable backend
//! providers, selecting the best target per request by latency, cost,
//! quality, capability match, round-robin, or session affinity, while
//! tracking each backend's health through per-provider circuit breakers
//! and falling back to alternates on failure.

pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod provider;
pub mod router;
pub mod telemetry;

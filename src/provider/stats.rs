//! Shared bookkeeping for backend adapters
//!
//! Every concrete adapter tracks the same aggregate request statistics and
//! publishes the same event stream; this module keeps that logic in one
//! place. Counters use atomics for lock-free reads under concurrent
//! request traffic.

use super::{ProviderEvent, ProviderHealth, ProviderMetrics};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

/// Buffered event capacity; the registry pump drains continuously, so this
/// only needs to absorb short bursts.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Aggregate statistics plus the provider event channel
///
/// `record` is called once per completed backend request and emits a
/// `MetricsUpdated` event carrying the new aggregate snapshot.
pub struct AdapterCore {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    total_latency_ms: AtomicU64,
    events: broadcast::Sender<ProviderEvent>,
}

impl Default for AdapterCore {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterCore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            events,
        }
    }

    /// Record one request outcome and publish the updated snapshot
    pub fn record(&self, latency: Duration, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);

        // Send failures only mean no subscriber is listening yet
        let _ = self
            .events
            .send(ProviderEvent::MetricsUpdated(self.snapshot()));
    }

    /// Publish a health observation
    pub fn publish_health(&self, health: ProviderHealth) {
        let _ = self.events.send(ProviderEvent::HealthUpdated(health));
    }

    /// Current aggregate snapshot
    pub fn snapshot(&self) -> ProviderMetrics {
        let total = self.total_requests.load(Ordering::Relaxed);
        let successful = self.successful_requests.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);
        let average_response_time = if total == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(total_latency / total)
        };
        ProviderMetrics {
            total_requests: total,
            successful_requests: successful,
            average_response_time,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

/// Accumulates byte chunks and yields complete lines
///
/// Both the NDJSON (Ollama) and SSE (OpenAI, Anthropic) stream formats are
/// line-delimited; a chunk boundary can split a line anywhere.
pub(crate) struct LineBuffer {
    buffer: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    /// Append a chunk and drain every complete line
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        let mut lines = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line = self.buffer[..newline].trim_end_matches('\r').to_string();
            self.buffer.drain(..=newline);
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }
}

//! Global atomic counters for goal decision observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as one `tracing::info!` event,
//! e.g. when a host process shuts down or on a periodic tick.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    decisions: AtomicU64,
    predictions: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    rule_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            decisions: AtomicU64::new(0),
            predictions: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            rule_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_decisions(&self) {
        self.decisions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "decisions", "counter incremented");
    }

    pub fn inc_predictions(&self) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "predictions", "counter incremented");
    }

    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts rules isolated under the isolate-and-report failure policy.
    pub fn inc_rule_failures(&self) {
        self.rule_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rule_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            decisions = self.decisions(),
            predictions = self.predictions(),
            cache_hits = self.cache_hits(),
            cache_misses = self.cache_misses(),
            rule_failures = self.rule_failures(),
        );
    }

    pub fn decisions(&self) -> u64 {
        self.decisions.load(Ordering::Relaxed)
    }

    pub fn predictions(&self) -> u64 {
        self.predictions.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn rule_failures(&self) -> u64 {
        self.rule_failures.load(Ordering::Relaxed)
    }
}

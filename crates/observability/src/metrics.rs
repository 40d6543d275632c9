//! In-process metrics registry.
//!
//! Counters and histograms for integration actions and job latencies. This
//! is a local sink; exporting to an external system is out of scope, so the
//! registry keeps everything queryable in-process (useful in tests and for
//! the reconciliation summaries).

use std::collections::HashMap;
use std::sync::Mutex;

/// Thread-safe counter/histogram store keyed by metric name.
///
/// Recording never fails from the caller's perspective; a poisoned lock
/// drops the sample rather than propagating a panic into business code.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: Mutex<HashMap<String, u64>>,
    histograms: Mutex<HashMap<String, Vec<f64>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a named counter by one.
    pub fn increment_counter(&self, name: &str) {
        self.add_to_counter(name, 1);
    }

    /// Increment a named counter by `delta`.
    pub fn add_to_counter(&self, name: &str, delta: u64) {
        if let Ok(mut counters) = self.counters.lock() {
            *counters.entry(name.to_string()).or_insert(0) += delta;
        }
    }

    /// Record one observation into a named histogram.
    pub fn record_histogram(&self, name: &str, value: f64) {
        if let Ok(mut histograms) = self.histograms.lock() {
            histograms.entry(name.to_string()).or_default().push(value);
        }
    }

    /// Current value of a counter (0 if never incremented).
    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .ok()
            .and_then(|c| c.get(name).copied())
            .unwrap_or(0)
    }

    /// Number of observations recorded for a histogram.
    pub fn histogram_count(&self, name: &str) -> usize {
        self.histograms
            .lock()
            .ok()
            .and_then(|h| h.get(name).map(Vec::len))
            .unwrap_or(0)
    }

    /// Mean of a histogram's observations, if any were recorded.
    pub fn histogram_mean(&self, name: &str) -> Option<f64> {
        let histograms = self.histograms.lock().ok()?;
        let samples = histograms.get(name)?;
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }
}

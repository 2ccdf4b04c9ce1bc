//! In-process metrics collaborator.
//!
//! Counters accumulate for the life of the [`Metrics`] value, which is
//! created once at startup and shared by `Arc`. Each recording method takes
//! the lock once, so a single logical update is atomic. Only
//! [`Metrics::reset`] clears them.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;

#[derive(Default)]
struct Inner {
    calls: BTreeMap<String, u64>,
    success: BTreeMap<String, u64>,
    status: BTreeMap<String, BTreeMap<u16, u64>>,
    latencies: BTreeMap<String, Vec<u64>>,
    source_mix: BTreeMap<String, u64>,
    dedupe_ratio: f64,
}

/// Shared metrics store.
#[derive(Default)]
pub struct Metrics {
    inner: Mutex<Inner>,
}

/// Point-in-time copy of all metrics, ready to serialize.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub connector_calls: BTreeMap<String, u64>,
    pub connector_success: BTreeMap<String, u64>,
    /// Per connector, count of each non-200 outcome (0 = no status).
    pub connector_status: BTreeMap<String, BTreeMap<u16, u64>>,
    /// Average latency per connector, in milliseconds.
    pub latency_ms: BTreeMap<String, f64>,
    pub dedupe_ratio: f64,
    /// Counts keyed by `"{lang}-{region}"`.
    pub source_mix: BTreeMap<String, u64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Counters stay usable even if a recorder panicked mid-update.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record one connector invocation.
    pub fn record_connector_metric(&self, connector: &str, status: u16, latency_ms: u64) {
        let mut inner = self.lock();
        *inner.calls.entry(connector.to_string()).or_default() += 1;
        if status == 200 {
            *inner.success.entry(connector.to_string()).or_default() += 1;
        } else {
            *inner
                .status
                .entry(connector.to_string())
                .or_default()
                .entry(status)
                .or_default() += 1;
        }
        inner
            .latencies
            .entry(connector.to_string())
            .or_default()
            .push(latency_ms);
    }

    /// Record the language/region of one normalized document.
    pub fn record_source(&self, lang: Option<&str>, region: Option<&str>) {
        let key = format!(
            "{}-{}",
            lang.filter(|l| !l.is_empty()).unwrap_or("unknown"),
            region.filter(|r| !r.is_empty()).unwrap_or("unknown")
        );
        *self.lock().source_mix.entry(key).or_default() += 1;
    }

    /// Record the dedup outcome of the latest pipeline run.
    pub fn record_dedupe_ratio(&self, total: usize, unique: usize) {
        self.lock().dedupe_ratio = dedupe_ratio(total, unique);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.lock();
        let latency_ms = inner
            .latencies
            .iter()
            .map(|(name, values)| {
                let avg = if values.is_empty() {
                    0.0
                } else {
                    values.iter().sum::<u64>() as f64 / values.len() as f64
                };
                (name.clone(), avg)
            })
            .collect();

        MetricsSnapshot {
            connector_calls: inner.calls.clone(),
            connector_success: inner.success.clone(),
            connector_status: inner.status.clone(),
            latency_ms,
            dedupe_ratio: inner.dedupe_ratio,
            source_mix: inner.source_mix.clone(),
        }
    }

    pub fn reset(&self) {
        *self.lock() = Inner::default();
    }
}

/// `unique / total`, or 0 when nothing was collected.
pub fn dedupe_ratio(total: usize, unique: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        unique as f64 / total as f64
    }
}

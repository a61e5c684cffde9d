//! Translation counters for the health endpoint and log lines.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters owned by a `TranslationClient`.
#[derive(Debug, Default)]
pub struct TranslationMetrics {
    /// Requests sent to any mirror
    api_calls: AtomicUsize,

    /// Translate calls that exhausted every mirror
    api_failures: AtomicUsize,

    /// Times a mirror failed and the next one was tried
    mirror_failovers: AtomicUsize,

    /// Localized reply strings served from cache
    cache_hits: AtomicUsize,

    /// Localized reply strings that had to be translated
    cache_misses: AtomicUsize,
}

impl TranslationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_api_call(&self) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_api_failure(&self) {
        self.api_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failover(&self) {
        self.mirror_failovers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn api_calls(&self) -> usize {
        self.api_calls.load(Ordering::Relaxed)
    }

    pub fn api_failures(&self) -> usize {
        self.api_failures.load(Ordering::Relaxed)
    }

    pub fn mirror_failovers(&self) -> usize {
        self.mirror_failovers.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> MetricsReport {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total_cache_queries = hits + misses;
        let cache_hit_rate = if total_cache_queries > 0 {
            (hits as f64 / total_cache_queries as f64) * 100.0
        } else {
            0.0
        };

        MetricsReport {
            api_calls: self.api_calls(),
            api_failures: self.api_failures(),
            mirror_failovers: self.mirror_failovers(),
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate,
        }
    }
}

/// Snapshot of the counters, serialized by `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub api_calls: usize,
    pub api_failures: usize,
    pub mirror_failovers: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,

    /// Cache hit rate as a percentage (0-100)
    pub cache_hit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_empty() {
        let report = TranslationMetrics::new().report();
        assert_eq!(report.api_calls, 0);
        assert_eq!(report.api_failures, 0);
        assert_eq!(report.cache_hit_rate, 0.0);
    }

    #[test]
    fn test_report_counts() {
        let metrics = TranslationMetrics::new();
        metrics.record_api_call();
        metrics.record_api_call();
        metrics.record_failover();
        metrics.record_api_failure();

        let report = metrics.report();
        assert_eq!(report.api_calls, 2);
        assert_eq!(report.mirror_failovers, 1);
        assert_eq!(report.api_failures, 1);
    }

    #[test]
    fn test_report_cache_hit_rate() {
        let metrics = TranslationMetrics::new();

        // 3 hits, 1 miss = 75% hit rate
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();

        assert_eq!(metrics.report().cache_hit_rate, 75.0);
    }

    #[test]
    fn test_report_serializes() {
        let json = serde_json::to_value(TranslationMetrics::new().report()).unwrap();
        assert_eq!(json["api_calls"], 0);
        assert!(json.get("cache_hit_rate").is_some());
    }
}

//! Prometheus metrics for the pipeline worker.
//!
//! The server registers these alongside its HTTP metrics via [`all_metrics`].

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts};

// =============================================================================
// Scans
// =============================================================================

/// Scans by result.
pub static SCANS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("invoq_scans_total", "Total mailbox scans"),
        &["result"], // "ok", "listing_failed", "criteria_failed"
    )
    .unwrap()
});

/// Scan duration in seconds.
pub static SCAN_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("invoq_scan_duration_seconds", "Duration of one mailbox scan")
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
    )
    .unwrap()
});

// =============================================================================
// Messages
// =============================================================================

/// Messages by terminal outcome.
pub static MESSAGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("invoq_messages_total", "Messages reaching a terminal outcome"),
        &["outcome"], // "delivered", "discarded", "flagged"
    )
    .unwrap()
});

/// Flagged messages by the stage that failed.
pub static STAGE_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("invoq_stage_failures_total", "Message failures by stage"),
        &["stage"],
    )
    .unwrap()
});

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(SCANS_TOTAL.clone()),
        Box::new(SCAN_DURATION.clone()),
        Box::new(MESSAGES_TOTAL.clone()),
        Box::new(STAGE_FAILURES_TOTAL.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register_once() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        MESSAGES_TOTAL.with_label_values(&["delivered"]).inc();
        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.contains(&"invoq_messages_total".to_string()));
    }
}

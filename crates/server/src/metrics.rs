//! Prometheus metrics for observability.
//!
//! - HTTP request metrics (latency, counts, in flight)
//! - Queue state gauges, collected at scrape time
//! - Pipeline worker metrics from `invoq_core::metrics`

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use regex_lite::Regex;
use tracing::warn;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "invoq_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("invoq_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "invoq_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Queue State (collected dynamically)
// =============================================================================

/// Entries in the queue mirror.
pub static MIRROR_ENTRIES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "invoq_mirror_entries",
        "Messages currently mirrored for the control API",
    )
    .unwrap()
});

/// Current cursor (slider) value.
pub static CURSOR_VALUE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("invoq_cursor_value", "First uid the next scan will consider").unwrap()
});

/// Worker running state (1 = running, 0 = stopped or disabled).
pub static WORKER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "invoq_worker_running",
        "Whether the pipeline worker is running (1) or not (0)",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    let server: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUEST_DURATION.clone()),
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()),
        Box::new(MIRROR_ENTRIES.clone()),
        Box::new(CURSOR_VALUE.clone()),
        Box::new(WORKER_RUNNING.clone()),
    ];

    for metric in server
        .into_iter()
        .chain(invoq_core::metrics::all_metrics())
    {
        if let Err(e) = registry.register(metric) {
            warn!("Failed to register metric: {}", e);
        }
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Refresh gauges from the cursor, the mirror and the worker.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    CURSOR_VALUE.set(i64::from(state.cursor().get().await));

    match state.mirror().len().await {
        Ok(len) => MIRROR_ENTRIES.set(len as i64),
        Err(e) => warn!("Failed to read mirror size: {}", e),
    }

    let running = state.worker().is_some_and(|w| w.is_running());
    WORKER_RUNNING.set(i64::from(running));
}

static NUMERIC_SEGMENT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"/\d+(/|$)").ok());

/// Normalize a path for metric labels (replace numeric ids with placeholders).
pub fn normalize_path(path: &str) -> String {
    let Some(re) = NUMERIC_SEGMENT.as_ref() else {
        return path.to_string();
    };
    // Adjacent ids share a slash, so a single pass can skip every other one.
    let once = re.replace_all(path, "/{id}$1");
    re.replace_all(&once, "/{id}$1").into_owned()
}

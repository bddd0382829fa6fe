//! Prometheus metrics for tls-forward.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Forwards by final outcome
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "tls_forward_requests_total",
        "Total number of forward requests processed",
        &["outcome"]  // ok|validation|factory|transport|decode|panic
    )
    .unwrap();

    /// Full pipeline duration
    pub static ref FORWARD_DURATION_MS: HistogramVec = register_histogram_vec!(
        "tls_forward_duration_ms",
        "Histogram of forward duration in milliseconds, target round trip included",
        &["method"],
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0]
    )
    .unwrap();

    /// Status codes returned by targets
    pub static ref UPSTREAM_STATUS_TOTAL: CounterVec = register_counter_vec!(
        "tls_forward_upstream_status_total",
        "Count of status codes received from targets",
        &["status"]
    )
    .unwrap();
}

/// Collect all metrics in Prometheus text format.
pub fn collect_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Method label for forwards rejected before a target method was known.
pub const UNKNOWN_METHOD: &str = "-";

pub fn record_outcome(outcome: &str) {
    REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
}

/// `method` is the target method, or [`UNKNOWN_METHOD`] when validation failed.
pub fn record_duration(method: &str, duration_ms: f64) {
    FORWARD_DURATION_MS
        .with_label_values(&[method])
        .observe(duration_ms);
}

pub fn record_upstream_status(status: u16) {
    UPSTREAM_STATUS_TOTAL
        .with_label_values(&[&status.to_string()])
        .inc();
}

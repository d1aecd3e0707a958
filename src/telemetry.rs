use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();
}

/// Start the Prometheus HTTP exporter on :9000.
/// After this call, any metrics recorded via the `metrics` crate
/// macros (counter!, histogram!) are automatically exported at /metrics.
pub fn init_metrics() {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], 9000))
        .install()
        .expect("failed to start Prometheus metrics server");
}

// ── Upstream metrics ─────────────────────────────────────────────

pub fn record_upstream_call(endpoint: &'static str, outcome: &'static str) {
    counter!("upstream_calls_total", "endpoint" => endpoint, "outcome" => outcome).increment(1);
}

pub fn record_upstream_latency(endpoint: &'static str, latency_ms: f64) {
    histogram!("upstream_call_latency_ms", "endpoint" => endpoint).record(latency_ms);
}

// ── Cache metrics ────────────────────────────────────────────────

pub fn record_refresh(changed: bool) {
    let outcome = if changed { "updated" } else { "unchanged" };
    counter!("refresh_cycles_total", "outcome" => outcome).increment(1);
}

pub fn record_snapshot_served() {
    counter!("snapshots_served_total").increment(1);
}

// Prometheus metrics for the Vexor API

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Once;

lazy_static! {
    // Global registry
    pub static ref REGISTRY: Registry = Registry::new();

    // API request counter
    pub static ref API_REQUESTS: CounterVec = CounterVec::new(
        Opts::new("vexor_api_requests_total", "Total API requests"),
        &["endpoint", "method", "status"]
    )
    .expect("metric can be created");

    // /assert and /execute outcomes: passed, failed, or a sandbox error kind
    pub static ref ASSERT_OUTCOMES: CounterVec = CounterVec::new(
        Opts::new("vexor_assert_outcomes_total", "Sandbox run outcomes"),
        &["outcome"]
    )
    .expect("metric can be created");

    // Sandbox run time histogram (in milliseconds)
    pub static ref SANDBOX_RUN_TIME: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "vexor_sandbox_run_time_ms",
            "Sandbox run time in milliseconds"
        )
        .buckets(vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]),
        &["outcome"]
    )
    .expect("metric can be created");

    pub static ref LIVE_ISOLATES: IntGauge = IntGauge::new(
        "vexor_live_isolates",
        "QuickJS isolates currently alive"
    )
    .expect("metric can be created");

    // LLM and PageSpeed failures
    pub static ref COLLABORATOR_FAILURES: CounterVec = CounterVec::new(
        Opts::new("vexor_collaborator_failures_total", "Failed calls to external services"),
        &["collaborator"]
    )
    .expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(API_REQUESTS.clone()))
            .expect("collector can be registered");

        REGISTRY
            .register(Box::new(ASSERT_OUTCOMES.clone()))
            .expect("collector can be registered");

        REGISTRY
            .register(Box::new(SANDBOX_RUN_TIME.clone()))
            .expect("collector can be registered");

        REGISTRY
            .register(Box::new(LIVE_ISOLATES.clone()))
            .expect("collector can be registered");

        REGISTRY
            .register(Box::new(COLLABORATOR_FAILURES.clone()))
            .expect("collector can be registered");
    });
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record the outcome and duration of one sandbox run
pub fn record_run(outcome: &str, execution_ms: f64) {
    ASSERT_OUTCOMES.with_label_values(&[outcome]).inc();
    SANDBOX_RUN_TIME
        .with_label_values(&[outcome])
        .observe(execution_ms);
}

pub fn record_request(endpoint: &str, method: &str, status: u16) {
    API_REQUESTS
        .with_label_values(&[endpoint, method, &status.to_string()])
        .inc();
}

pub fn set_live_isolates(live: usize) {
    LIVE_ISOLATES.set(live as i64);
}

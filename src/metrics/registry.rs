use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Error Metrics
    pub static ref ERRORS_TRANSLATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "errors_translated_total",
        "Total handler errors translated into an envelope",
        &["kind", "status"]
    )
    .unwrap();

    pub static ref ERRORS_REDACTED_TOTAL: IntCounter = register_int_counter!(
        "errors_redacted_total",
        "Errors collapsed to a generic 500 before reaching the client"
    )
    .unwrap();

    // Process Metrics
    pub static ref FATAL_TRIGGERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "fatal_triggers_total",
        "Failures that escaped request scope",
        &["trigger"]  // trigger: panic, unhandled_rejection, sigint, sigterm
    )
    .unwrap();
}

/// Initialize all metrics (called on startup)
pub fn init_metrics() {
    // Force lazy_static initialization
    lazy_static::initialize(&HTTP_REQUESTS_TOTAL);
    lazy_static::initialize(&HTTP_REQUEST_DURATION_SECONDS);
    lazy_static::initialize(&ERRORS_TRANSLATED_TOTAL);
    lazy_static::initialize(&ERRORS_REDACTED_TOTAL);
    lazy_static::initialize(&FATAL_TRIGGERS_TOTAL);
}

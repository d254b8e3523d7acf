use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
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

    // Attempt store metrics
    pub static ref STORE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempt_store_operations_total",
        "Total number of attempt store operations",
        &["operation", "backend", "status"]
    )
    .unwrap();

    pub static ref STORE_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "attempt_store_operation_duration_seconds",
        "Attempt store operation duration in seconds",
        &["operation", "backend"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // Business Metrics
    pub static ref ATTEMPTS_STARTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempts_started_total",
        "Total number of quiz attempts started",
        &["result"]
    )
    .unwrap();

    pub static ref PROGRESS_SAVES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempt_progress_saves_total",
        "Total number of progress autosaves by outcome",
        &["result"]
    )
    .unwrap();

    pub static ref VIOLATIONS_RECORDED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempt_violations_recorded_total",
        "Total number of integrity violations recorded",
        &["violation_type"]
    )
    .unwrap();

    pub static ref ATTEMPTS_CLOSED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempts_closed_total",
        "Total number of attempts moved to a terminal status",
        &["status"]
    )
    .unwrap();

    pub static ref WRITE_CONFLICTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempt_write_conflicts_total",
        "Total number of optimistic version conflicts",
        &["operation"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track attempt store operation with metrics
pub async fn track_store_operation<F, T, E>(
    operation: &str,
    backend: &str,
    future: F,
) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    STORE_OPERATIONS_TOTAL
        .with_label_values(&[operation, backend, status])
        .inc();

    STORE_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, backend])
        .observe(duration);

    result
}

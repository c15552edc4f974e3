use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
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

    // LLM provider metrics
    pub static ref LLM_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "llm_requests_total",
        "Total number of language model requests",
        &["operation", "status"]
    )
    .unwrap();

    pub static ref LLM_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "llm_request_duration_seconds",
        "Language model request duration in seconds",
        &["operation"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .unwrap();

    // Battle metrics
    pub static ref BATTLES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "battles_total",
        "Battles by lifecycle event",
        &["status"]
    )
    .unwrap();

    pub static ref BATTLES_ACTIVE: IntGauge = register_int_gauge!(
        "battles_active",
        "Number of battles currently in progress"
    )
    .unwrap();

    pub static ref ANSWERS_CHECKED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "answers_checked_total",
        "Answers graded, by player and correctness",
        &["player", "correct"]
    )
    .unwrap();

    pub static ref TIMER_EXPIRIES_TOTAL: IntCounter = register_int_counter!(
        "timer_expiries_total",
        "Questions auto-submitted because their countdown expired"
    )
    .unwrap();

    pub static ref ORACLE_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "oracle_failures_total",
        "Answer oracle failures that scored the AI as wrong",
        &["reason"]
    )
    .unwrap();

    pub static ref BATTLE_RESULTS_SAVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "battle_results_saved_total",
        "Attempts to persist completed battles",
        &["status"]
    )
    .unwrap();

    pub static ref SSE_CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        "sse_connections_active",
        "Number of active SSE connections"
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

/// Helper: track a language model call with metrics
pub async fn track_llm_operation<F, T, E>(operation: &str, future: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    LLM_REQUESTS_TOTAL
        .with_label_values(&[operation, status])
        .inc();

    LLM_REQUEST_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration);

    result
}

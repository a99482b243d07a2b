use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
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

    // Business Metrics
    pub static ref ATTEMPTS_STARTED_TOTAL: IntCounter = register_int_counter!(
        "attempts_started_total",
        "Total number of quiz attempts started"
    )
    .unwrap();

    pub static ref ATTEMPTS_FINALIZED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempts_finalized_total",
        "Total number of quiz attempts reaching a terminal state",
        &["status"]
    )
    .unwrap();

    pub static ref QUESTIONS_SUBMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "questions_submitted_total",
        "Total number of question answers submitted",
        &["correct"]
    )
    .unwrap();

    pub static ref SWEEPER_TICKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "sweeper_ticks_total",
        "Total number of timeout sweeper ticks",
        &["status"]
    )
    .unwrap();

    pub static ref METRICS_QUERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "metrics_queries_total",
        "Total number of performance metrics queries",
        &["period"]
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        let _ = HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/health", "200"])
            .get();
        let _ = ATTEMPTS_STARTED_TOTAL.get();
    }

    #[test]
    fn test_render_metrics() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let result = render_metrics();
        assert!(result.is_ok());
        let output = result.unwrap();
        assert!(output.contains("http_requests_total"));
    }
}

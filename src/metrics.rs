use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

use crate::models::SessionRecord;

/// Install the Prometheus recorder and return its render handle
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    init_metric_descriptions();

    Ok(handle)
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(
        "usage_api_requests_total",
        "Total number of tracker API requests"
    );
    describe_histogram!(
        "usage_api_request_duration_seconds",
        "Tracker API request duration in seconds"
    );
    describe_counter!(
        "usage_sessions_recorded_total",
        "Sessions appended to the usage document"
    );
    describe_counter!(
        "usage_tokens_recorded_total",
        "Tokens recorded across appended sessions"
    );
    describe_counter!(
        "usage_sessions_deleted_total",
        "Sessions removed by index"
    );
    describe_counter!(
        "usage_otel_records_total",
        "OTEL log records seen on the logs endpoint"
    );
    describe_counter!(
        "usage_store_errors_total",
        "Usage file load/save failures"
    );
    describe_gauge!(
        "usage_tracker_info",
        "Tracker version information"
    );

    gauge!("usage_tracker_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record an API request
pub fn record_request(endpoint: &str) {
    counter!("usage_api_requests_total", "endpoint" => endpoint.to_string()).increment(1);
}

/// Record API request duration
pub fn record_duration(endpoint: &str, duration: Duration) {
    histogram!(
        "usage_api_request_duration_seconds",
        "endpoint" => endpoint.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record an appended session and its token counts
pub fn record_session(source: &'static str, record: &SessionRecord) {
    counter!("usage_sessions_recorded_total", "source" => source).increment(1);
    counter!("usage_tokens_recorded_total", "direction" => "input")
        .increment(record.input.max(0) as u64);
    counter!("usage_tokens_recorded_total", "direction" => "output")
        .increment(record.output.max(0) as u64);
}

pub fn record_session_deleted() {
    counter!("usage_sessions_deleted_total").increment(1);
}

/// Record how many OTEL log records were accepted or skipped
pub fn record_otel_records(accepted: usize, skipped: usize) {
    counter!("usage_otel_records_total", "outcome" => "accepted").increment(accepted as u64);
    counter!("usage_otel_records_total", "outcome" => "skipped").increment(skipped as u64);
}

pub fn record_store_error(op: &'static str) {
    counter!("usage_store_errors_total", "op" => op).increment(1);
}

//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder. Job metrics emitted by the runner are
/// exported through the same handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "beatreel_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "beatreel_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "beatreel_http_requests_in_flight";

    // Control API
    pub const JOBS_SUBMITTED_TOTAL: &str = "beatreel_jobs_submitted_total";
    pub const VALIDATION_FAILURES_TOTAL: &str = "beatreel_validation_failures_total";
    pub const DOWNLOAD_BYTES_TOTAL: &str = "beatreel_download_bytes_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "beatreel_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_job_submitted(plan: &str) {
    let labels = [("plan", plan.to_string())];
    counter!(names::JOBS_SUBMITTED_TOTAL, &labels).increment(1);
}

pub fn record_validation_failure() {
    counter!(names::VALIDATION_FAILURES_TOTAL).increment(1);
}

pub fn record_download(bytes: u64) {
    counter!(names::DOWNLOAD_BYTES_TOTAL).increment(bytes);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Collapse job ids so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    let mut segments = path.split('/');
    let mut out = Vec::new();
    while let Some(segment) = segments.next() {
        out.push(segment.to_string());
        if matches!(segment, "export" | "download") {
            if let Some(_id) = segments.next() {
                out.push(":job_id".to_string());
            }
        }
    }
    out.join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/export/550e8400-e29b-41d4-a716-446655440000"),
            "/export/:job_id"
        );
        assert_eq!(sanitize_path("/download/abc"), "/download/:job_id");
        assert_eq!(sanitize_path("/export"), "/export");
        assert_eq!(sanitize_path("/health"), "/health");
    }
}

//! Prometheus metrics for observability.
//!
//! Two groups are exported:
//! - HTTP request metrics (latency, counts, in flight)
//! - Render metrics (jobs by outcome, active jobs, duration, frames)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    Opts, Registry, TextEncoder,
};

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
            "framecast_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("framecast_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "framecast_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Render Metrics
// =============================================================================

/// Render jobs by outcome (`completed`, `failed`, `rejected`).
pub static RENDERS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("framecast_renders_total", "Render jobs by outcome"),
        &["outcome"],
    )
    .unwrap()
});

/// Render jobs currently running.
pub static RENDERS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "framecast_renders_active",
        "Number of render jobs currently running",
    )
    .unwrap()
});

/// Wall time of finished renders.
pub static RENDER_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "framecast_render_duration_seconds",
            "Duration of completed render jobs in seconds",
        )
        .buckets(vec![0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
    )
    .unwrap()
});

/// Frames written by completed renders.
pub static FRAMES_RENDERED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "framecast_frames_rendered_total",
        "Total frames rendered by completed jobs",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Renders
    registry.register(Box::new(RENDERS_TOTAL.clone())).unwrap();
    registry.register(Box::new(RENDERS_ACTIVE.clone())).unwrap();
    registry.register(Box::new(RENDER_DURATION.clone())).unwrap();
    registry
        .register(Box::new(FRAMES_RENDERED_TOTAL.clone()))
        .unwrap();
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Normalize a path for metric labels (replace IDs and file names with placeholders).
pub fn normalize_path(path: &str) -> String {
    let uuid_regex = regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap();
    let file_regex = regex_lite::Regex::new(r"/renders/[^/]+$").unwrap();
    let numeric_regex = regex_lite::Regex::new(r"/\d+(/|$)").unwrap();

    let result = file_regex.replace(path, "/renders/{file}");
    let result = uuid_regex.replace_all(&result, "{id}");
    let result = numeric_regex.replace_all(&result, "/{id}$1");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/jobs/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/jobs/{id}");
    }

    #[test]
    fn test_normalize_path_render_file() {
        let path = "/api/v1/renders/intro-550e8400.mp4";
        assert_eq!(normalize_path(path), "/api/v1/renders/{file}");
    }

    #[test]
    fn test_normalize_path_numeric() {
        let path = "/api/v1/frames/12345/preview";
        assert_eq!(normalize_path(path), "/api/v1/frames/{id}/preview");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        let path = "/api/v1/health";
        assert_eq!(normalize_path(path), "/api/v1/health");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("framecast_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_all_metrics() {
        // Vec metrics only show up once a label set has been touched
        HTTP_REQUEST_DURATION
            .with_label_values(&["GET", "/test", "200"])
            .observe(0.1);
        RENDERS_TOTAL.with_label_values(&["completed"]).inc_by(0);

        let output = encode_metrics();

        assert!(output.contains("framecast_http_request_duration_seconds"));
        assert!(output.contains("framecast_http_requests_in_flight"));
        assert!(output.contains("framecast_renders_total"));
        assert!(output.contains("framecast_renders_active"));
        assert!(output.contains("framecast_render_duration_seconds"));
        assert!(output.contains("framecast_frames_rendered_total"));
    }
}

//! Observability metrics for the admission service.
//!
//! Collects admission review outcomes, escalation findings, identity
//! resolution failures, and HTTP-level request metrics.

use std::time::{Duration, Instant};

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use tracing::{debug, error};

/// Core metrics registry for the admission service
pub struct AdmissionMetricsRegistry {
    /// Prometheus registry for all metrics
    pub registry: Registry,

    // === Admission Metrics ===
    /// Admission reviews by decision
    pub admission_reviews_total: IntCounterVec,
    /// Evaluation latency by decision
    pub evaluation_duration: HistogramVec,
    /// Escalated grants found, by scope
    pub escalations_detected_total: IntCounterVec,
    /// Identity resolution failures by the behavior applied
    pub identity_resolution_failures_total: IntCounterVec,

    // === HTTP Request Metrics ===
    /// HTTP requests by method, endpoint, and status
    pub http_requests_total: IntCounterVec,
    /// HTTP request duration by endpoint
    pub http_request_duration: HistogramVec,
    /// Concurrent HTTP requests
    pub http_requests_in_flight: IntGauge,
}

impl AdmissionMetricsRegistry {
    /// Create a new metrics registry with all collectors initialized
    pub fn new() -> Self {
        let registry = Registry::new();

        let admission_reviews_total = IntCounterVec::new(
            Opts::new(
                "admission_reviews_total",
                "Total admission reviews evaluated",
            ),
            &["decision"],
        )
        .expect("Failed to create admission_reviews_total metric");

        let evaluation_duration = HistogramVec::new(
            HistogramOpts::new(
                "admission_evaluation_duration_seconds",
                "Duration of admission evaluations in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5,
            ]),
            &["decision"],
        )
        .expect("Failed to create evaluation_duration metric");

        let escalations_detected_total = IntCounterVec::new(
            Opts::new(
                "admission_escalations_detected_total",
                "Total escalated grants detected",
            ),
            &["scope"],
        )
        .expect("Failed to create escalations_detected_total metric");

        let identity_resolution_failures_total = IntCounterVec::new(
            Opts::new(
                "admission_identity_resolution_failures_total",
                "Total service account identity resolution failures",
            ),
            &["behavior"],
        )
        .expect("Failed to create identity_resolution_failures_total metric");

        let http_requests_total = IntCounterVec::new(
            Opts::new("admission_http_requests_total", "Total HTTP requests"),
            &["method", "endpoint", "status_code"],
        )
        .expect("Failed to create http_requests_total metric");

        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "admission_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ]),
            &["method", "endpoint"],
        )
        .expect("Failed to create http_request_duration metric");

        let http_requests_in_flight = IntGauge::new(
            "admission_http_requests_in_flight",
            "Number of HTTP requests currently being processed",
        )
        .expect("Failed to create http_requests_in_flight metric");

        let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(admission_reviews_total.clone()),
            Box::new(evaluation_duration.clone()),
            Box::new(escalations_detected_total.clone()),
            Box::new(identity_resolution_failures_total.clone()),
            Box::new(http_requests_total.clone()),
            Box::new(http_request_duration.clone()),
            Box::new(http_requests_in_flight.clone()),
        ];

        for metric in metrics {
            if let Err(e) = registry.register(metric) {
                error!("Failed to register metric: {}", e);
            }
        }

        Self {
            registry,
            admission_reviews_total,
            evaluation_duration,
            escalations_detected_total,
            identity_resolution_failures_total,
            http_requests_total,
            http_request_duration,
            http_requests_in_flight,
        }
    }

    /// Generate Prometheus metrics output
    pub fn gather_metrics(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Default for AdmissionMetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global admission metrics registry instance
pub static ADMISSION_METRICS: Lazy<AdmissionMetricsRegistry> =
    Lazy::new(AdmissionMetricsRegistry::new);

/// Metrics middleware recording per-request counters and latency
pub async fn admission_metrics_middleware(req: Request, next: Next) -> Response {
    let start_time = Instant::now();
    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map_or("unknown".to_string(), |p| normalize_endpoint(p.as_str()));

    ADMISSION_METRICS.http_requests_in_flight.inc();

    let response = next.run(req).await;

    ADMISSION_METRICS.http_requests_in_flight.dec();

    let duration = start_time.elapsed();
    let status_code = response.status();

    ADMISSION_METRICS
        .http_requests_total
        .with_label_values(&[
            method.as_str(),
            &path,
            &status_code.as_u16().to_string(),
        ])
        .inc();

    ADMISSION_METRICS
        .http_request_duration
        .with_label_values(&[method.as_str(), &path])
        .observe(duration.as_secs_f64());

    debug!(
        method = %method,
        path = %path,
        status = %status_code,
        duration_ms = %duration.as_millis(),
        "HTTP request processed"
    );

    response
}

/// Collapse paths onto the known endpoints to bound label cardinality
fn normalize_endpoint(path: &str) -> String {
    match path {
        p if p.starts_with("/validate") => "/validate".to_string(),
        p if p.starts_with("/health") => "/health".to_string(),
        p if p.starts_with("/metrics") => "/metrics".to_string(),
        _ => "other".to_string(),
    }
}

/// Helper functions for admission-specific metrics
pub struct AdmissionMetricsHelper;

impl AdmissionMetricsHelper {
    /// Record one evaluated review and its latency
    pub fn record_decision(decision: &str, duration: Duration) {
        ADMISSION_METRICS
            .admission_reviews_total
            .with_label_values(&[decision])
            .inc();

        ADMISSION_METRICS
            .evaluation_duration
            .with_label_values(&[decision])
            .observe(duration.as_secs_f64());
    }

    /// Record escalated grants found at one scope
    pub fn record_escalations(scope: &str, count: usize) {
        ADMISSION_METRICS
            .escalations_detected_total
            .with_label_values(&[scope])
            .inc_by(count as u64);
    }

    /// Record an identity resolution failure and the behavior applied
    pub fn record_identity_resolution_failure(behavior: &str) {
        ADMISSION_METRICS
            .identity_resolution_failures_total
            .with_label_values(&[behavior])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_metrics_registry_creation() {
        let metrics = AdmissionMetricsRegistry::new();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_decision_recording() {
        AdmissionMetricsHelper::record_decision("allowed", Duration::from_millis(5));
        AdmissionMetricsHelper::record_decision("denied", Duration::from_millis(7));
        AdmissionMetricsHelper::record_escalations("namespace", 3);
        AdmissionMetricsHelper::record_identity_resolution_failure("deny");
    }

    #[test]
    fn test_gathered_output_is_text_format() {
        AdmissionMetricsHelper::record_decision("allowed", Duration::from_millis(1));
        let output = ADMISSION_METRICS.gather_metrics().unwrap();
        assert!(output.contains("admission_reviews_total"));
    }

    #[test]
    fn test_endpoint_normalization() {
        assert_eq!(normalize_endpoint("/validate"), "/validate");
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/metrics"), "/metrics");
        assert_eq!(normalize_endpoint("/unexpected/route"), "other");
    }
}

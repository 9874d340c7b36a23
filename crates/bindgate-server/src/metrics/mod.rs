//! Prometheus metrics for Bindgate
//!
//! Exposed at `/management/metrics` in Prometheus format, behind the gate.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bindgate_auth::AuthResult;
use bindgate_core::{Error, Result};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::server::AppState;

/// Metric names
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "bindgate_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "bindgate_http_request_duration_seconds";

    // Authentication metrics
    pub const AUTH_ATTEMPTS_TOTAL: &str = "bindgate_auth_attempts_total";
    pub const AUTH_DURATION_SECONDS: &str = "bindgate_auth_duration_seconds";
    pub const DIRECTORY_FAILURES_TOTAL: &str = "bindgate_directory_failures_total";

    // System metrics
    pub const UPTIME_SECONDS: &str = "bindgate_uptime_seconds";
    pub const INFO: &str = "bindgate_info";
}

// The recorder is process-global; install it once
static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Metrics recorder
#[derive(Clone)]
pub struct MetricsRecorder {
    handle: PrometheusHandle,
    start_time: Instant,
}

impl MetricsRecorder {
    /// Initialize the metrics system
    pub fn new() -> Result<Self> {
        let handle = PROMETHEUS
            .get_or_try_init(|| PrometheusBuilder::new().install_recorder())
            .map_err(|e| Error::Server(format!("Failed to install Prometheus recorder: {}", e)))?
            .clone();

        gauge!(names::INFO, "version" => bindgate_core::VERSION).set(1.0);

        Ok(Self {
            handle,
            start_time: Instant::now(),
        })
    }

    /// Get metrics output in Prometheus format
    pub fn render(&self) -> String {
        gauge!(names::UPTIME_SECONDS).set(self.start_time.elapsed().as_secs_f64());

        self.handle.render()
    }

    /// Record an HTTP request
    pub fn record_http_request(&self, method: &str, status: u16, duration_secs: f64) {
        let status_class = format!("{}xx", status / 100);

        counter!(
            names::HTTP_REQUESTS_TOTAL,
            "method" => method.to_string(),
            "status" => status.to_string(),
            "status_class" => status_class
        )
        .increment(1);

        histogram!(
            names::HTTP_REQUEST_DURATION_SECONDS,
            "method" => method.to_string()
        )
        .record(duration_secs);
    }

    /// Record one authentication verdict
    pub fn record_auth(&self, result: &AuthResult, duration_secs: f64) {
        counter!(names::AUTH_ATTEMPTS_TOTAL, "outcome" => result.outcome()).increment(1);
        histogram!(names::AUTH_DURATION_SECONDS).record(duration_secs);

        if let AuthResult::TransportError(failure) = result {
            counter!(names::DIRECTORY_FAILURES_TOTAL, "kind" => failure.kind.as_str())
                .increment(1);
        }
    }
}

/// Axum middleware for recording HTTP metrics
pub async fn metrics_middleware(
    State(metrics): State<Arc<MetricsRecorder>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16();

    metrics.record_http_request(&method, status, duration);

    debug!(
        method = %method,
        path = %path,
        status = %status,
        duration_ms = %(duration * 1000.0),
        "Request completed"
    );

    response
}

/// Handler for /management/metrics endpoint
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let output = state.metrics.render();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        output,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindgate_auth::{TransportFailure, TransportFailureKind};

    #[test]
    fn test_recorder_can_be_created_twice() {
        assert!(MetricsRecorder::new().is_ok());
        assert!(MetricsRecorder::new().is_ok());
    }

    #[test]
    fn test_auth_outcomes_are_rendered() {
        let metrics = MetricsRecorder::new().unwrap();

        metrics.record_auth(&AuthResult::BindFailed, 0.01);
        metrics.record_auth(
            &AuthResult::TransportError(TransportFailure {
                kind: TransportFailureKind::Connect,
                message: "refused".into(),
            }),
            0.02,
        );

        let output = metrics.render();
        assert!(output.contains(names::AUTH_ATTEMPTS_TOTAL));
        assert!(output.contains("outcome=\"bind_failed\""));
        assert!(output.contains("kind=\"connect\""));
        assert!(output.contains(names::UPTIME_SECONDS));
    }
}

//! Prometheus metrics for Dirgate
//!
//! Exposes metrics at `/metrics` endpoint in Prometheus format.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::server::AppState;

/// Metric names
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "dirgate_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "dirgate_http_request_duration_seconds";

    pub const ENDPOINT_REQUESTS_TOTAL: &str = "dirgate_endpoint_requests_total";

    pub const UPTIME_SECONDS: &str = "dirgate_uptime_seconds";
    pub const INFO: &str = "dirgate_info";
}

/// The recorder is process-global; every `MetricsRecorder` shares it
static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Bridge endpoints for metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    CreateUser,
    Login,
    SearchUsers,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateUser => "CreateUser",
            Self::Login => "Login",
            Self::SearchUsers => "SearchUsers",
        }
    }

    /// Detect endpoint from HTTP method and path
    pub fn from_request(method: &str, path: &str) -> Option<Self> {
        match (method, path.trim_end_matches('/')) {
            ("POST", "/users") => Some(Self::CreateUser),
            ("GET", "/users") => Some(Self::SearchUsers),
            ("POST", "/login") => Some(Self::Login),
            _ => None,
        }
    }
}

/// Metrics recorder
#[derive(Clone)]
pub struct MetricsRecorder {
    handle: PrometheusHandle,
    start_time: Instant,
}

impl MetricsRecorder {
    /// Install the Prometheus recorder on first use
    pub fn new() -> dirgate_core::Result<Self> {
        let handle = PROMETHEUS
            .get_or_try_init(|| PrometheusBuilder::new().install_recorder())
            .map_err(|e| dirgate_core::Error::Metrics(e.to_string()))?
            .clone();

        gauge!(names::INFO, "version" => dirgate_core::VERSION).set(1.0);

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
        counter!(
            names::HTTP_REQUESTS_TOTAL,
            "method" => method.to_string(),
            "status" => status.to_string(),
            "status_class" => format!("{}xx", status / 100)
        )
        .increment(1);

        histogram!(
            names::HTTP_REQUEST_DURATION_SECONDS,
            "method" => method.to_string()
        )
        .record(duration_secs);
    }

    /// Record a bridge endpoint outcome
    pub fn record_endpoint(&self, endpoint: Endpoint, success: bool) {
        counter!(
            names::ENDPOINT_REQUESTS_TOTAL,
            "endpoint" => endpoint.as_str(),
            "status" => if success { "success" } else { "error" }
        )
        .increment(1);
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
    let endpoint = Endpoint::from_request(&method, &path);

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16();

    metrics.record_http_request(&method, status, duration);

    if let Some(endpoint) = endpoint {
        metrics.record_endpoint(endpoint, status < 400);
    }

    debug!(
        method = %method,
        path = %path,
        status = %status,
        duration_ms = %(duration * 1000.0),
        "Request completed"
    );

    response
}

/// Handler for /metrics endpoint
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
}

//! Health Check and Metrics Endpoint
//!
//! Small HTTP server for orchestrators and scrapers, separate from the gRPC
//! listener so probes never pass through the access policy.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON status with subscriber counts
//! - `GET /healthz` - liveness probe
//! - `GET /readyz` - readiness probe, fails once shutdown has begun
//! - `GET /metrics` - Prometheus text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::registry::SharedObserverHub;

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Gateway version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Number of consumers in the access policy.
    pub consumers: usize,
    /// Live admin subscribers.
    pub subscribers: SubscriberStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Accepting calls.
    Healthy,
    /// Shutdown has begun.
    ShuttingDown,
}

/// Admin subscriber counts.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SubscriberStatus {
    /// Call log subscribers.
    pub log: usize,
    /// Statistics subscribers.
    pub stat: usize,
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    consumers: usize,
    hub: SharedObserverHub,
    shutdown: CancellationToken,
}

impl HealthServerState {
    /// Create state reporting on `hub` until `shutdown` is cancelled.
    #[must_use]
    pub fn new(
        version: String,
        consumers: usize,
        hub: SharedObserverHub,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            consumers,
            hub,
            shutdown,
        }
    }

    fn snapshot(&self) -> HealthResponse {
        let stats = self.hub.stats();
        let status = if self.shutdown.is_cancelled() {
            HealthStatus::ShuttingDown
        } else {
            HealthStatus::Healthy
        };

        HealthResponse {
            status,
            version: self.version.clone(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            current_time: Utc::now(),
            consumers: self.consumers,
            subscribers: SubscriberStatus {
                log: stats.log_subscribers,
                stat: stats.stat_subscribers,
            },
        }
    }
}

// =============================================================================
// Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the server stops with
    /// an error.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = state.snapshot();
    let code = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.shutdown.is_cancelled() {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    } else {
        (StatusCode::OK, "READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::infrastructure::registry::ObserverHub;

    fn state() -> (Arc<HealthServerState>, SharedObserverHub, CancellationToken) {
        let hub = Arc::new(ObserverHub::with_defaults());
        let token = CancellationToken::new();
        let state = Arc::new(HealthServerState::new(
            "0.1.0".to_string(),
            2,
            Arc::clone(&hub),
            token.clone(),
        ));
        (state, hub, token)
    }

    async fn get_status(state: Arc<HealthServerState>, path: &str) -> StatusCode {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        router(state).oneshot(request).await.unwrap().status()
    }

    #[test]
    fn status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::ShuttingDown).unwrap(),
            "\"shutting_down\""
        );
    }

    #[test]
    fn snapshot_counts_subscribers() {
        let (state, hub, _) = state();
        let _a = hub.log().register().unwrap();
        let _b = hub.log().register().unwrap();
        let _c = hub.stat().register().unwrap();

        let snapshot = state.snapshot();
        assert_eq!(snapshot.status, HealthStatus::Healthy);
        assert_eq!(snapshot.consumers, 2);
        assert_eq!(snapshot.subscribers.log, 2);
        assert_eq!(snapshot.subscribers.stat, 1);
    }

    #[tokio::test]
    async fn readiness_follows_shutdown() {
        let (state, _, token) = state();
        assert_eq!(get_status(Arc::clone(&state), "/readyz").await, StatusCode::OK);
        assert_eq!(get_status(Arc::clone(&state), "/healthz").await, StatusCode::OK);

        token.cancel();
        assert_eq!(
            get_status(Arc::clone(&state), "/readyz").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(state, "/health").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}

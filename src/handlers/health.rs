//! Health and readiness endpoints.
//!
//! - **Health** (`/health`): always 200, reports each store's reachability
//! - **Readiness** (`/ready`): 503 unless every store answers a ping
//!
//! Both probe the stores live, bounded by `STORE_TIMEOUT_MS`.

use axum::Json;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use chrono::Utc;
use tracing::instrument;

use crate::error::AppError;
use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint.
///
/// ```json
/// {
///   "status": "healthy",
///   "counter_store_up": true,
///   "credential_store_up": true,
///   "order_store_up": true,
///   "version": "0.1.0",
///   "uptime_seconds": 42,
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let health = state.probe_stores().await;

    Json(HealthResponse {
        status: if health.all_up() {
            "healthy"
        } else {
            "degraded"
        }
        .to_string(),
        counter_store_up: health.counter,
        credential_store_up: health.credentials,
        order_store_up: health.orders,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        timestamp: Utc::now(),
    })
}

/// Readiness check endpoint for orchestrator probes.
#[instrument(skip(state))]
pub async fn readiness_check(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    let health = state.probe_stores().await;
    if health.all_up() {
        Ok(StatusCode::OK)
    } else {
        Err(AppError::DependencyUnavailable(format!(
            "store probe failed: {health:?}"
        )))
    }
}

/// Fallback for unknown routes.
pub async fn not_found() -> AppError {
    AppError::not_found("resource not found", "no route matches this path")
}

/// Fallback for known routes called with the wrong method.
pub async fn method_not_allowed(method: Method) -> AppError {
    AppError::MethodNotAllowed(method.to_string())
}

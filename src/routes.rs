//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │   Error Path     │ ← Fills `path` in structured error bodies
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← Answers preflights before the gate
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Request ID     │ ← Sets and propagates X-Request-Id
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response spans
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Gatekeeper     │ ← 429/503 from the rate limiter, 401/400 from auth
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Body Limit     │ ← 413 above MAX_REQUEST_BODY_SIZE
//! └────────┬─────────┘
//!          ▼
//!      Handler
//! ```
//!
//! # Route Groups
//!
//! - `/register`, `/health`, `/ready` - public (rate limited, not authenticated)
//! - `/api/orders` - order API (Basic auth)

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderName;
use axum::routing::get;
use axum::routing::post;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::middleware::{ErrorPathLayer, GatekeeperLayer};
use crate::state::AppState;

/// Header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the application router with all routes and middleware configured.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    let cors = build_cors_layer(&config.cors_allowed_origins);
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let router = Router::new()
        // Public endpoints
        .route("/register", post(handlers::register))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        // Order API
        .route(
            "/api/orders",
            get(handlers::list_orders).post(handlers::create_order),
        )
        .route(
            "/api/orders/{id}",
            get(handlers::get_order)
                .put(handlers::update_order)
                .delete(handlers::delete_order),
        )
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::method_not_allowed);

    info!(
        max_body_bytes = config.max_request_body_size,
        "Request body size limit configured"
    );

    if config.rate_limiting_enabled() {
        info!(
            limit = config.rate_limit_per_window,
            window_secs = config.rate_limit_window.as_secs(),
            limiter = %config.rate_limiter_name,
            fail_open = config.rate_limit_fail_open,
            "Global rate limiting enabled"
        );
    } else {
        info!("Rate limiting disabled (RATE_LIMIT_PER_WINDOW=0)");
    }
    info!(public_paths = ?config.public_paths, "Basic authentication enabled");

    // Applied bottom to top: the last layer added runs first.
    router
        .layer(DefaultBodyLimit::max(config.max_request_body_size))
        .layer(GatekeeperLayer::new(state.gatekeeper.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(cors)
        .layer(ErrorPathLayer)
        .with_state(state)
}

/// Build CORS layer from configuration (`*` allows any origin).
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    if allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_cors_layer_any() {
        let _layer = build_cors_layer(&["*".to_string()]);
    }

    #[test]
    fn test_build_cors_layer_specific() {
        let _layer = build_cors_layer(&[
            "https://shop.example.com".to_string(),
            "not a header value\n".to_string(),
        ]);
    }
}

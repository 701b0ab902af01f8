//! Tower layer running every request through the [`Gatekeeper`].
//!
//! # Response Headers
//!
//! On rate limit exceeded (429):
//! - `Retry-After`: Seconds until the current window closes
//! - `X-RateLimit-Limit`: Requests allowed per window
//! - `X-RateLimit-Remaining`: Always `0`
//!
//! Admitted requests carry `X-RateLimit-Limit` and `X-RateLimit-Remaining`
//! for the window they were counted in.
//!
//! On authentication failure (401): `WWW-Authenticate: Basic realm="checkout"`.
//!
//! The authenticated [`Identity`](crate::gate::Identity) is inserted into the
//! request extensions for handlers.

use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderValue, Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::error::{AppError, RATE_LIMIT_LIMIT_HEADER, RATE_LIMIT_REMAINING_HEADER};
use crate::gate::{GateRejection, GateStage, Gatekeeper};
use crate::metrics;

/// Layer applying the rate limiter and authenticator.
#[derive(Clone)]
pub struct GatekeeperLayer {
    gatekeeper: Gatekeeper,
}

impl GatekeeperLayer {
    pub fn new(gatekeeper: Gatekeeper) -> Self {
        Self { gatekeeper }
    }
}

impl<S> Layer<S> for GatekeeperLayer {
    type Service = GatekeeperService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GatekeeperService {
            inner,
            gatekeeper: self.gatekeeper.clone(),
        }
    }
}

/// Gatekeeper service wrapper.
#[derive(Clone)]
pub struct GatekeeperService<S> {
    inner: S,
    gatekeeper: Gatekeeper,
}

impl<S> Service<Request<Body>> for GatekeeperService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let gatekeeper = self.gatekeeper.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let path = req.uri().path().to_string();

            let started = Instant::now();
            let outcome = gatekeeper.admit(&path, req.headers().get(AUTHORIZATION)).await;
            metrics::record_gate_duration(started.elapsed().as_secs_f64());

            let admission = match outcome {
                Ok(admission) => admission,
                Err(rejection) => return Ok(reject(&path, rejection)),
            };

            if admission.window.is_some() {
                metrics::record_rate_limit_check("allowed");
            }
            debug!(
                path = %path,
                stage = %admission.stage,
                username = admission.identity.as_ref().map(|i| i.username.as_str()),
                "Request admitted"
            );

            let window = admission.window;
            if let Some(identity) = admission.identity {
                req.extensions_mut().insert(identity);
            }

            let mut response = inner.call(req).await?;
            metrics::record_gate_decision(GateStage::Dispatched.as_str());

            if let Some(window) = window {
                let headers = response.headers_mut();
                headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(window.limit));
                headers.insert(
                    RATE_LIMIT_REMAINING_HEADER,
                    HeaderValue::from(window.remaining()),
                );
            }

            Ok(response)
        })
    }
}

/// Terminal rejection: record it and render the error response.
fn reject(path: &str, rejection: GateRejection) -> Response<Body> {
    let stage = rejection.stage();

    match &rejection {
        GateRejection::RateLimited {
            limit,
            retry_after_secs,
        } => {
            metrics::record_rate_limit_check("rejected");
            warn!(path, limit, retry_after_secs, "Rate limit exceeded");
        }
        GateRejection::CounterStore(err) => {
            metrics::record_rate_limit_check("store_error");
            warn!(path, error = %err, "Rate limit check failed, rejecting request");
        }
        GateRejection::Auth(err) => {
            warn!(path, reason = %err, "Authentication rejected");
        }
    }

    metrics::record_gate_decision(stage.as_str());
    AppError::from(rejection).into_response()
}

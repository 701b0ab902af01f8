//! Fills the `path` field of structured error bodies.
//!
//! [`AppError`](crate::error::AppError) renders its body without knowing
//! which request it belongs to and leaves a copy of the body in the response
//! extensions. This layer sits outermost, sees the request path, and
//! re-serializes that body with the path filled in.

use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::CONTENT_LENGTH;
use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::warn;

use crate::error::ErrorBody;

#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorPathLayer;

impl<S> Layer<S> for ErrorPathLayer {
    type Service = ErrorPathService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ErrorPathService { inner }
    }
}

#[derive(Clone)]
pub struct ErrorPathService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for ErrorPathService<S>
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

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let path = req.uri().path().to_string();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let mut response = inner.call(req).await?;

            let Some(body) = response.extensions_mut().remove::<ErrorBody>() else {
                return Ok(response);
            };

            match serde_json::to_vec(&body.at_path(&path)) {
                Ok(bytes) => {
                    response.headers_mut().remove(CONTENT_LENGTH);
                    *response.body_mut() = Body::from(bytes);
                }
                Err(e) => warn!(error = %e, "Failed to re-encode error body"),
            }

            Ok(response)
        })
    }
}

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::header::{HeaderName, HeaderValue, RETRY_AFTER, WWW_AUTHENTICATE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

/// Header carrying the configured ceiling on 429 responses.
pub const RATE_LIMIT_LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");

/// Header carrying the remaining allowance on 429 responses.
pub const RATE_LIMIT_REMAINING_HEADER: HeaderName =
    HeaderName::from_static("x-ratelimit-remaining");

/// Challenge sent with every 401.
static BASIC_CHALLENGE: HeaderValue = HeaderValue::from_static(r#"Basic realm="checkout""#);

/// Application-wide error types with appropriate HTTP status codes.
///
/// Every failure that leaves the service goes through [`IntoResponse`] for
/// this type, which renders the structured [`ErrorBody`]. The request path is
/// filled in afterwards by [`ErrorPathLayer`](crate::middleware::ErrorPathLayer),
/// since it is not known where the error is raised.
///
/// # Status mapping
///
/// | Variant                  | Status |
/// |--------------------------|--------|
/// | `BadRequest`             | 400    |
/// | `Unauthenticated`        | 401    |
/// | `NotFound`               | 404    |
/// | `MethodNotAllowed`       | 405    |
/// | `Conflict`               | 409    |
/// | `PayloadTooLarge`        | 413    |
/// | `RateLimited`            | 429    |
/// | `DependencyUnavailable`  | 503    |
/// | `Internal`, `ConfigError`| 500    |
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{message}: {reason}")]
    BadRequest { message: String, reason: String },

    #[error("{message}: {reason}")]
    Unauthenticated { message: String, reason: String },

    #[error("{message}: {reason}")]
    NotFound { message: String, reason: String },

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("{message}: {reason}")]
    Conflict { message: String, reason: String },

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("rate limit exceeded ({limit} requests per window)")]
    RateLimited { limit: u64, retry_after_secs: u64 },

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AppError {
    /// Shorthand for a 400 with a user-facing message and a diagnostic reason.
    pub fn bad_request(message: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a 401.
    pub fn unauthenticated(message: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a 404.
    pub fn not_found(message: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a 409.
    pub fn conflict(message: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            reason: reason.into(),
        }
    }

    /// HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Split into the `(message, error)` pair of the response body.
    ///
    /// Dependency and internal failures keep a fixed client message; the
    /// underlying cause only appears in the `error` field.
    fn message_and_reason(&self) -> (String, String) {
        match self {
            AppError::BadRequest { message, reason }
            | AppError::Unauthenticated { message, reason }
            | AppError::NotFound { message, reason }
            | AppError::Conflict { message, reason } => (message.clone(), reason.clone()),
            AppError::MethodNotAllowed(method) => {
                ("method not allowed".to_string(), method.clone())
            }
            AppError::PayloadTooLarge(cause) => {
                ("request body too large".to_string(), cause.clone())
            }
            AppError::RateLimited { .. } => (
                "rate limit exceeded".to_string(),
                "too many requests in the current window".to_string(),
            ),
            AppError::DependencyUnavailable(cause) => (
                "service temporarily unavailable, please retry".to_string(),
                cause.clone(),
            ),
            AppError::Internal(cause) => ("internal error".to_string(), cause.clone()),
            AppError::ConfigError(cause) => {
                ("service configuration error".to_string(), cause.clone())
            }
        }
    }
}

/// Error response body shared by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub status: u16,
    pub message: String,
    pub error: String,
    pub path: String,
    pub timestamp: String,
}

impl ErrorBody {
    /// Copy of this body bound to the request path.
    pub fn at_path(&self, path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..self.clone()
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Client errors are expected traffic; only server-side failures are
        // logged at error level.
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let (message, error) = self.message_and_reason();
        let body = ErrorBody {
            status: status.as_u16(),
            message,
            error,
            path: String::new(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };

        let mut response = (status, axum::Json(body.clone())).into_response();
        let headers = response.headers_mut();

        match &self {
            AppError::RateLimited {
                limit,
                retry_after_secs,
            } => {
                headers.insert(RETRY_AFTER, HeaderValue::from(*retry_after_secs));
                headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(*limit));
                headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(0u64));
            }
            AppError::Unauthenticated { .. } => {
                headers.insert(WWW_AUTHENTICATE, BASIC_CHALLENGE.clone());
            }
            _ => {}
        }

        response.extensions_mut().insert(body);
        response
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(cause) => AppError::DependencyUnavailable(cause),
            StoreError::Query(cause) => AppError::Internal(cause),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return AppError::PayloadTooLarge(rejection.body_text());
        }
        AppError::bad_request("invalid json body", sanitize_json_rejection(&rejection))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::bad_request("invalid path parameter", rejection.body_text())
    }
}

/// Reduce a JSON rejection to something safe to show clients.
///
/// Serde messages can contain internal type names, so only the missing or
/// unknown field name is kept.
fn sanitize_json_rejection(rejection: &JsonRejection) -> String {
    let msg = rejection.body_text();

    for marker in ["missing field", "unknown field"] {
        if msg.contains(marker)
            && let Some(start) = msg.find('`')
            && let Some(end) = msg[start + 1..].find('`')
        {
            let field = &msg[start + 1..start + 1 + end];
            return format!("{marker} `{field}`");
        }
    }

    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            "expected request with `Content-Type: application/json`".to_string()
        }
        JsonRejection::JsonSyntaxError(_) => "malformed JSON in request body".to_string(),
        JsonRejection::JsonDataError(_) => "invalid data type in request body".to_string(),
        _ => "invalid request format".to_string(),
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

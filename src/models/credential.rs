use serde::Deserialize;

use crate::error::{AppError, AppResult};

/// A registered username and its sealed secret.
///
/// `secret` holds whatever the configured
/// [`SecretVerifier`](crate::gate::SecretVerifier) produced at registration:
/// an Argon2 PHC string, or the plaintext itself for the legacy scheme.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Credential {
    pub username: String,
    pub secret: String,
}

/// Request body for `POST /register`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    /// Accepted as `password` too, the field name older clients send.
    #[serde(alias = "password")]
    pub secret: String,
}

impl RegisterRequest {
    /// Reject registrations the Basic scheme could never authenticate.
    ///
    /// The username cannot contain `:` because the header payload is split
    /// on the first colon. The decoded payload is trimmed before the split,
    /// so the username cannot start or end with whitespace and the secret
    /// cannot end with it.
    pub fn validate(&self) -> AppResult<()> {
        if self.username.trim().is_empty() {
            return Err(AppError::bad_request(
                "wrong Json body",
                "username is required",
            ));
        }
        if self.username.contains(':') {
            return Err(AppError::bad_request(
                "wrong Json body",
                "username cannot contain ':'",
            ));
        }
        if self.username != self.username.trim() {
            return Err(AppError::bad_request(
                "wrong Json body",
                "username cannot start or end with whitespace",
            ));
        }
        if self.secret.is_empty() {
            return Err(AppError::bad_request("wrong Json body", "secret is required"));
        }
        if self.secret != self.secret.trim_end() {
            return Err(AppError::bad_request(
                "wrong Json body",
                "secret cannot end with whitespace",
            ));
        }
        Ok(())
    }
}

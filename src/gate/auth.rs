//! HTTP Basic authentication against the credential store.
//!
//! # Header handling
//!
//! ```text
//! Authorization: Basic YWxpY2U6c2VjcmV0
//!                ^^^^^^ stripped only when present (case-sensitive unless
//!                       case-insensitive mode is on)
//!                       ^^^^^^^^^^^^^^^^ standard base64 of "alice:secret"
//! ```
//!
//! A header without the scheme prefix is decoded as-is, so `YWxpY2U6c2VjcmV0`
//! alone authenticates too. The decoded payload is whitespace-trimmed and
//! split on the first `:`; the secret may itself contain colons.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;
use tracing::{debug, warn};

use super::secret::{SealError, SecretVerifier};
use crate::error::AppError;
use crate::store::{CredentialStore, StoreError};

const BASIC_PREFIX: &str = "Basic ";

/// The authenticated principal, attached to the request after the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
}

/// Why a request could not be authenticated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no credentials provided")]
    MissingCredentials,

    /// The header is not valid base64, or decodes to something that is not UTF-8.
    #[error("malformed credentials")]
    MalformedCredentials,

    /// The payload decoded but has no `username:secret` separator.
    #[error("malformed credentials: missing ':' separator")]
    MalformedPair,

    #[error("user not found")]
    UnknownUser,

    #[error("wrong password")]
    WrongSecret,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Seal(#[from] SealError),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MalformedPair => {
                AppError::bad_request("not authorized, check credentials", err.to_string())
            }
            AuthError::MissingCredentials
            | AuthError::MalformedCredentials
            | AuthError::UnknownUser
            | AuthError::WrongSecret => AppError::unauthenticated("not authorized", err.to_string()),
            AuthError::Store(store) => AppError::from(store),
            AuthError::Seal(seal) => AppError::Internal(seal.to_string()),
        }
    }
}

/// Decode an `Authorization` header value into `(username, secret)`.
///
/// Pure function over the header text; it never touches a store.
pub fn decode_basic_credentials(
    header: &str,
    case_insensitive: bool,
) -> Result<(String, String), AuthError> {
    if header.is_empty() {
        return Err(AuthError::MissingCredentials);
    }

    let encoded = strip_scheme(header, case_insensitive);
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|_| AuthError::MalformedCredentials)?;
    let payload = String::from_utf8(decoded).map_err(|_| AuthError::MalformedCredentials)?;

    let (username, secret) = payload
        .trim()
        .split_once(':')
        .ok_or(AuthError::MalformedPair)?;

    Ok((username.to_string(), secret.to_string()))
}

fn strip_scheme(header: &str, case_insensitive: bool) -> &str {
    if let Some(rest) = header.strip_prefix(BASIC_PREFIX) {
        return rest;
    }
    if case_insensitive
        && let Some(scheme) = header.get(..BASIC_PREFIX.len())
        && let Some(rest) = header.get(BASIC_PREFIX.len()..)
        && scheme.eq_ignore_ascii_case(BASIC_PREFIX)
    {
        return rest;
    }
    header
}

/// Verifies Basic credentials against a [`CredentialStore`].
#[derive(Clone)]
pub struct Authenticator {
    credentials: Arc<dyn CredentialStore>,
    verifier: Arc<dyn SecretVerifier>,
    case_insensitive_scheme: bool,
}

impl Authenticator {
    pub fn new(credentials: Arc<dyn CredentialStore>, verifier: Arc<dyn SecretVerifier>) -> Self {
        Self {
            credentials,
            verifier,
            case_insensitive_scheme: false,
        }
    }

    /// Also strip `basic `, `BASIC ` and other casings of the scheme prefix.
    pub fn with_case_insensitive_scheme(mut self, enabled: bool) -> Self {
        self.case_insensitive_scheme = enabled;
        self
    }

    /// Authenticate the raw `Authorization` header value.
    pub async fn verify(&self, raw_header: Option<&str>) -> Result<Identity, AuthError> {
        let header = raw_header.ok_or(AuthError::MissingCredentials)?;
        let (username, secret) = decode_basic_credentials(header, self.case_insensitive_scheme)?;

        let Some(credential) = self.credentials.find(&username).await? else {
            debug!(username = %username, "Authentication failed: unknown user");
            return Err(AuthError::UnknownUser);
        };

        if !self.verifier.verify(secret, credential.secret).await? {
            warn!(username = %username, "Authentication failed: wrong secret");
            return Err(AuthError::WrongSecret);
        }

        debug!(username = %username, "Authenticated");
        Ok(Identity { username })
    }
}

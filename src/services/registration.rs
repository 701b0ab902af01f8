use std::sync::Arc;

use tracing::{info, instrument};

use crate::error::{AppError, AppResult};
use crate::gate::SecretVerifier;
use crate::metrics;
use crate::models::{Credential, RegisterRequest};
use crate::store::CredentialStore;

/// Creates credentials. The secret is sealed before it reaches the store.
#[derive(Clone)]
pub struct RegistrationService {
    credentials: Arc<dyn CredentialStore>,
    verifier: Arc<dyn SecretVerifier>,
}

impl RegistrationService {
    pub fn new(credentials: Arc<dyn CredentialStore>, verifier: Arc<dyn SecretVerifier>) -> Self {
        Self {
            credentials,
            verifier,
        }
    }

    /// Register `request.username`.
    ///
    /// # Errors
    ///
    /// `AppError::BadRequest` if the request is invalid or the username is
    /// already registered. The existing credential is never replaced.
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn register(&self, request: RegisterRequest) -> AppResult<()> {
        request.validate()?;

        let sealed = self
            .verifier
            .seal(request.secret)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let credential = Credential {
            username: request.username,
            secret: sealed,
        };

        let inserted = self
            .credentials
            .insert_if_absent(&credential)
            .await
            .map_err(|e| {
                metrics::record_store_error("credential");
                AppError::from(e)
            })?;

        if !inserted {
            metrics::record_registration("duplicate");
            return Err(AppError::bad_request(
                "username exists",
                "Error: duplicate registration",
            ));
        }

        metrics::record_registration("created");
        info!(username = %credential.username, "User registered");
        Ok(())
    }
}

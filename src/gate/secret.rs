//! Secret sealing and verification.
//!
//! The credential store never sees a raw secret when [`Argon2Verifier`] is
//! configured: registration stores the PHC string and login verifies against
//! it. [`PlaintextVerifier`] keeps the legacy table format where the secret
//! column holds the secret itself.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Sealing or verification could not run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("secret {operation} failed: {reason}")]
pub struct SealError {
    pub operation: &'static str,
    pub reason: String,
}

impl SealError {
    fn seal(reason: impl ToString) -> Self {
        Self {
            operation: "sealing",
            reason: reason.to_string(),
        }
    }

    fn verify(reason: impl ToString) -> Self {
        Self {
            operation: "verification",
            reason: reason.to_string(),
        }
    }
}

/// Turns secrets into their stored form and checks candidates against it.
#[async_trait]
pub trait SecretVerifier: Send + Sync {
    /// Stored form of `secret`.
    async fn seal(&self, secret: String) -> Result<String, SealError>;

    /// Whether `candidate` matches the stored form `sealed`.
    async fn verify(&self, candidate: String, sealed: String) -> Result<bool, SealError>;
}

/// Stores secrets as-is and compares them in constant time.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextVerifier;

#[async_trait]
impl SecretVerifier for PlaintextVerifier {
    async fn seal(&self, secret: String) -> Result<String, SealError> {
        Ok(secret)
    }

    async fn verify(&self, candidate: String, sealed: String) -> Result<bool, SealError> {
        Ok(candidate.as_bytes().ct_eq(sealed.as_bytes()).into())
    }
}

/// Salted Argon2id hashes in PHC string format.
///
/// Hashing is CPU bound and runs on the blocking pool.
#[derive(Clone)]
pub struct Argon2Verifier {
    params: Params,
}

impl Argon2Verifier {
    /// Verifier with the library's recommended parameters
    /// (19 MiB, 2 iterations, 1 lane).
    pub fn new() -> Self {
        Self {
            params: Params::DEFAULT,
        }
    }

    /// Verifier with custom cost parameters. Cheap settings keep tests fast.
    pub fn with_params(
        memory_cost_kib: u32,
        time_cost: u32,
        parallelism: u32,
    ) -> Result<Self, SealError> {
        let params =
            Params::new(memory_cost_kib, time_cost, parallelism, None).map_err(SealError::seal)?;
        Ok(Self { params })
    }
}

impl Default for Argon2Verifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretVerifier for Argon2Verifier {
    async fn seal(&self, secret: String) -> Result<String, SealError> {
        let params = self.params.clone();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
                .hash_password(secret.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(SealError::seal)
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Secret sealing task failed");
            SealError::seal(e)
        })?
    }

    async fn verify(&self, candidate: String, sealed: String) -> Result<bool, SealError> {
        tokio::task::spawn_blocking(move || {
            // A stored value that is not a PHC string cannot match anything.
            let Ok(parsed) = PasswordHash::new(&sealed) else {
                tracing::warn!("Stored secret is not an Argon2 hash");
                return Ok(false);
            };
            // Parameters are read back from the PHC string.
            Ok(Argon2::default()
                .verify_password(candidate.as_bytes(), &parsed)
                .is_ok())
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Secret verification task failed");
            SealError::verify(e)
        })?
    }
}

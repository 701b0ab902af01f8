//! The gatekeeper pipeline in front of the order API.
//!
//! ```text
//! Start ──rate check──► RateChecked ──authenticate──► Authenticated ──► Dispatched
//!   │                       │
//!   ▼                       ▼
//! RejectedRateLimit     RejectedAuth
//! ```
//!
//! Every request ends in exactly one terminal stage. Public paths go from
//! `RateChecked` straight to `Dispatched` without authenticating.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use tracing::warn;

pub mod auth;
pub mod rate_limiter;
pub mod secret;

pub use auth::{AuthError, Authenticator, Identity, decode_basic_credentials};
pub use rate_limiter::{
    FixedWindowLimiter, ManualClock, SystemClock, UnixClock, WindowDecision, window_key,
};
pub use secret::{Argon2Verifier, PlaintextVerifier, SealError, SecretVerifier};

use crate::error::AppError;
use crate::store::StoreError;

/// Where a request is in the gatekeeper pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateStage {
    Start,
    RateChecked,
    Authenticated,
    Dispatched,
    RejectedRateLimit,
    RejectedAuth,
}

impl GateStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GateStage::Dispatched | GateStage::RejectedRateLimit | GateStage::RejectedAuth
        )
    }

    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            GateStage::Start => "start",
            GateStage::RateChecked => "rate_checked",
            GateStage::Authenticated => "authenticated",
            GateStage::Dispatched => "dispatched",
            GateStage::RejectedRateLimit => "rejected_rate_limit",
            GateStage::RejectedAuth => "rejected_auth",
        }
    }
}

impl fmt::Display for GateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single global rate limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatePolicy {
    pub limiter_name: String,
    /// Requests allowed per window. `0` turns rate limiting off.
    pub limit: u64,
    pub window: Duration,
    /// Let requests through when the counter store fails.
    pub fail_open: bool,
}

impl RatePolicy {
    pub fn is_enabled(&self) -> bool {
        self.limit > 0
    }
}

/// A request that made it through the gate.
#[derive(Debug, Clone)]
pub struct Admission {
    /// `None` on public paths.
    pub identity: Option<Identity>,
    pub stage: GateStage,
    /// `None` when rate limiting is off or the counter store failed open.
    pub window: Option<WindowDecision>,
}

/// A request the gate turned away.
#[derive(Debug, thiserror::Error)]
pub enum GateRejection {
    #[error("rate limit of {limit} exceeded, window resets in {retry_after_secs}s")]
    RateLimited { limit: u64, retry_after_secs: u64 },

    #[error("counter store failed: {0}")]
    CounterStore(StoreError),

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
}

impl GateRejection {
    /// Terminal stage this rejection leaves the request in.
    pub fn stage(&self) -> GateStage {
        match self {
            GateRejection::RateLimited { .. } | GateRejection::CounterStore(_) => {
                GateStage::RejectedRateLimit
            }
            GateRejection::Auth(_) => GateStage::RejectedAuth,
        }
    }
}

impl From<GateRejection> for AppError {
    fn from(rejection: GateRejection) -> Self {
        match rejection {
            GateRejection::RateLimited {
                limit,
                retry_after_secs,
            } => AppError::RateLimited {
                limit,
                retry_after_secs,
            },
            GateRejection::CounterStore(err) => AppError::from(err),
            GateRejection::Auth(err) => AppError::from(err),
        }
    }
}

/// Rate limiter followed by authenticator.
#[derive(Clone)]
pub struct Gatekeeper {
    limiter: FixedWindowLimiter,
    authenticator: Authenticator,
    policy: Arc<RatePolicy>,
    public_paths: Arc<HashSet<String>>,
}

impl Gatekeeper {
    pub fn new(
        limiter: FixedWindowLimiter,
        authenticator: Authenticator,
        policy: RatePolicy,
        public_paths: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            limiter,
            authenticator,
            policy: Arc::new(policy),
            public_paths: Arc::new(public_paths.into_iter().collect()),
        }
    }

    pub fn policy(&self) -> &RatePolicy {
        &self.policy
    }

    /// Exact match against the configured public paths.
    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.contains(path)
    }

    /// Run a request through the pipeline.
    ///
    /// Returns at the first failing step; the authenticator is never consulted
    /// for a request the rate limiter rejected, and the `Authorization` header
    /// is not even read on public paths.
    pub async fn admit(
        &self,
        path: &str,
        authorization: Option<&HeaderValue>,
    ) -> Result<Admission, GateRejection> {
        let window = self.check_rate().await?;

        if self.is_public(path) {
            return Ok(Admission {
                identity: None,
                stage: GateStage::RateChecked,
                window,
            });
        }

        // A value that is not visible ASCII cannot hold base64.
        let header = authorization
            .map(HeaderValue::to_str)
            .transpose()
            .map_err(|_| AuthError::MalformedCredentials)?;
        let identity = self.authenticator.verify(header).await?;

        Ok(Admission {
            identity: Some(identity),
            stage: GateStage::Authenticated,
            window,
        })
    }

    async fn check_rate(&self) -> Result<Option<WindowDecision>, GateRejection> {
        if !self.policy.is_enabled() {
            return Ok(None);
        }

        match self
            .limiter
            .check(&self.policy.limiter_name, self.policy.limit, self.policy.window)
            .await
        {
            Ok(decision) if decision.allowed => Ok(Some(decision)),
            Ok(decision) => Err(GateRejection::RateLimited {
                limit: decision.limit,
                retry_after_secs: decision.reset_after_secs,
            }),
            Err(err) if self.policy.fail_open => {
                warn!(error = %err, "Counter store failed, admitting request without rate check");
                crate::metrics::record_store_error("counter");
                Ok(None)
            }
            Err(err) => {
                crate::metrics::record_store_error("counter");
                Err(GateRejection::CounterStore(err))
            }
        }
    }
}

//! Application configuration loaded from environment variables.
//!
//! All configuration is loaded from environment variables with defaults that
//! run a single in-memory instance. An optional `.env` file is honoured.
//!
//! # Stores
//!
//! - `REDIS_URL`: counter store for the rate limiter. Unset means an
//!   in-process counter, which only limits this one instance.
//! - `DATABASE_URL`: PostgreSQL for credentials and orders. Unset means
//!   in-process maps that are lost on restart.
//!
//! # Gatekeeper
//!
//! - `RATE_LIMIT_PER_WINDOW` / `RATE_LIMIT_WINDOW_SECS`: one global fixed
//!   window (default 100 per 60s, `0` disables)
//! - `RATE_LIMIT_FAIL_OPEN`: admit requests when the counter store is down
//! - `SECRET_SCHEME`: `argon2` (default) or `plaintext`
//! - `PUBLIC_PATHS`: comma-separated paths that skip authentication

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::gate::RatePolicy;

/// How secrets are stored in the credential store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecretScheme {
    #[default]
    Argon2,
    /// Secrets stored verbatim, compared in constant time.
    Plaintext,
}

impl FromStr for SecretScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "argon2" => Ok(SecretScheme::Argon2),
            "plaintext" => Ok(SecretScheme::Plaintext),
            other => Err(format!("unknown secret scheme '{other}'")),
        }
    }
}

impl fmt::Display for SecretScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretScheme::Argon2 => f.write_str("argon2"),
            SecretScheme::Plaintext => f.write_str("plaintext"),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 8080)
    pub port: u16,

    // =========================================================================
    // Store Configuration
    // =========================================================================
    /// PostgreSQL URL for credentials and orders (None = in-memory)
    pub database_url: Option<String>,

    /// Maximum pooled PostgreSQL connections (default: 10)
    pub db_max_connections: u32,

    /// Redis URL for rate-limit counters (None = in-memory)
    pub redis_url: Option<String>,

    /// Upper bound on a single store call or pool acquire (default: 2s)
    pub store_timeout: Duration,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Requests allowed per window across all instances (default: 100, 0 = disabled)
    pub rate_limit_per_window: u64,

    /// Fixed window length (default: 60s)
    pub rate_limit_window: Duration,

    /// Prefix of the counter keys (default: "global_rate_limiter")
    pub rate_limiter_name: String,

    /// Admit requests when the counter store fails (default: false)
    pub rate_limit_fail_open: bool,

    // =========================================================================
    // Authentication Configuration
    // =========================================================================
    pub secret_scheme: SecretScheme,

    /// Accept any casing of the `Basic ` prefix (default: false)
    pub auth_scheme_case_insensitive: bool,

    /// Paths that skip authentication; still rate limited.
    /// Default: ["/register", "/health", "/ready"]
    pub public_paths: Vec<String>,

    // =========================================================================
    // HTTP Configuration
    // =========================================================================
    /// Maximum request body size in bytes (default: 1MB)
    pub max_request_body_size: usize,

    /// Comma-separated list of allowed CORS origins ("*" allows all)
    pub cors_allowed_origins: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Interval between background store probes (default: 15s)
    pub health_check_interval: Duration,

    /// Port for Prometheus metrics endpoint (default: 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if a value does not parse or the
    /// combination is invalid.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 8080)?,

            // Stores
            database_url: Self::optional_env("DATABASE_URL"),
            db_max_connections: Self::parse_env("DB_MAX_CONNECTIONS", 10)?,
            redis_url: Self::optional_env("REDIS_URL"),
            store_timeout: Duration::from_millis(Self::parse_env("STORE_TIMEOUT_MS", 2000)?),

            // Rate limiting
            rate_limit_per_window: Self::parse_env("RATE_LIMIT_PER_WINDOW", 100)?,
            rate_limit_window: Duration::from_secs(Self::parse_env("RATE_LIMIT_WINDOW_SECS", 60)?),
            rate_limiter_name: env::var("RATE_LIMITER_NAME")
                .unwrap_or_else(|_| "global_rate_limiter".to_string()),
            rate_limit_fail_open: Self::parse_env("RATE_LIMIT_FAIL_OPEN", false)?,

            // Authentication
            secret_scheme: Self::parse_env("SECRET_SCHEME", SecretScheme::Argon2)?,
            auth_scheme_case_insensitive: Self::parse_env("AUTH_SCHEME_CASE_INSENSITIVE", false)?,
            public_paths: Self::parse_public_paths(),

            // HTTP
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 1024 * 1024)?,
            cors_allowed_origins: Self::parse_cors_origins(),

            // Observability
            health_check_interval: Duration::from_secs(Self::parse_env(
                "HEALTH_CHECK_INTERVAL_SECS",
                15,
            )?),
            metrics_port: Self::parse_env("METRICS_PORT", 0)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    fn validate(&self) -> AppResult<()> {
        if self.rate_limit_window.is_zero() {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_WINDOW_SECS must be greater than 0".to_string(),
            ));
        }

        if self.rate_limiter_name.trim().is_empty() {
            return Err(AppError::ConfigError(
                "RATE_LIMITER_NAME cannot be empty".to_string(),
            ));
        }

        if self.store_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "STORE_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }

        if self.db_max_connections == 0 {
            return Err(AppError::ConfigError(
                "DB_MAX_CONNECTIONS must be greater than 0".to_string(),
            ));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.health_check_interval.is_zero() {
            return Err(AppError::ConfigError(
                "HEALTH_CHECK_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn rate_limiting_enabled(&self) -> bool {
        self.rate_limit_per_window > 0
    }

    /// The global rate limit in the form the gatekeeper consumes.
    pub fn rate_policy(&self) -> RatePolicy {
        RatePolicy {
            limiter_name: self.rate_limiter_name.clone(),
            limit: self.rate_limit_per_window,
            window: self.rate_limit_window,
            fail_open: self.rate_limit_fail_open,
        }
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address, `None` when disabled.
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    fn optional_env(name: &str) -> Option<String> {
        env::var(name).ok().filter(|v| !v.trim().is_empty())
    }

    /// Parse CORS allowed origins from environment variable.
    fn parse_cors_origins() -> Vec<String> {
        split_list(&env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string()))
    }

    /// Parse public paths. Entries not starting with `/` are ignored.
    fn parse_public_paths() -> Vec<String> {
        split_list(
            &env::var("PUBLIC_PATHS").unwrap_or_else(|_| DEFAULT_PUBLIC_PATHS.join(",")),
        )
        .into_iter()
        .filter(|p| p.starts_with('/'))
        .collect()
    }
}

const DEFAULT_PUBLIC_PATHS: [&str; 3] = ["/register", "/health", "/ready"];

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: None,
            db_max_connections: 10,
            redis_url: None,
            store_timeout: Duration::from_secs(2),
            rate_limit_per_window: 100,
            rate_limit_window: Duration::from_secs(60),
            rate_limiter_name: "global_rate_limiter".to_string(),
            rate_limit_fail_open: false,
            secret_scheme: SecretScheme::Argon2,
            auth_scheme_case_insensitive: false,
            public_paths: DEFAULT_PUBLIC_PATHS.iter().map(|p| p.to_string()).collect(),
            max_request_body_size: 1024 * 1024,
            cors_allowed_origins: vec!["*".to_string()],
            health_check_interval: Duration::from_secs(15),
            metrics_port: 0,
        }
    }
}

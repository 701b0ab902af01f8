//! Shared application state for Axum handlers.
//!
//! Holds the services behind the routes, the gatekeeper, and handles to the
//! three stores for health probes.
//!
//! # Structured Concurrency
//!
//! The background store probe is managed with `tokio_util::task::TaskTracker`
//! and `CancellationToken`. Call `shutdown()` to stop it before exit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::config::{Config, SecretScheme};
use crate::gate::{
    Argon2Verifier, Authenticator, FixedWindowLimiter, Gatekeeper, PlaintextVerifier,
    SecretVerifier, SystemClock, UnixClock,
};
use crate::metrics;
use crate::services::{OrderService, RegistrationService};
use crate::store::{CounterStore, CredentialStore, OrderRepository};

/// The three stores the service runs on.
#[derive(Clone)]
pub struct Stores {
    pub counter: Arc<dyn CounterStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub orders: Arc<dyn OrderRepository>,
}

/// Reachability of each store at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHealth {
    pub counter: bool,
    pub credentials: bool,
    pub orders: bool,
}

impl StoreHealth {
    pub fn all_up(&self) -> bool {
        self.counter && self.credentials && self.orders
    }
}

/// Shared application state for Axum handlers.
///
/// Cloned per request; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    pub registration: RegistrationService,
    pub gatekeeper: Gatekeeper,
    pub started_at: Instant,
    pub config: Arc<Config>,
    stores: Stores,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Build the state on the wall clock and start the background probe.
    pub fn new(config: Config, stores: Stores) -> Self {
        Self::with_clock(config, stores, Arc::new(SystemClock))
    }

    /// Like [`new`](Self::new) with the rate limiter reading `clock`.
    pub fn with_clock(config: Config, stores: Stores, clock: Arc<dyn UnixClock>) -> Self {
        let verifier: Arc<dyn SecretVerifier> = match config.secret_scheme {
            SecretScheme::Argon2 => Arc::new(Argon2Verifier::new()),
            SecretScheme::Plaintext => Arc::new(PlaintextVerifier),
        };

        let authenticator = Authenticator::new(stores.credentials.clone(), verifier.clone())
            .with_case_insensitive_scheme(config.auth_scheme_case_insensitive);
        let limiter = FixedWindowLimiter::with_clock(stores.counter.clone(), clock);
        let gatekeeper = Gatekeeper::new(
            limiter,
            authenticator,
            config.rate_policy(),
            config.public_paths.iter().cloned(),
        );

        let state = Self {
            orders: OrderService::new(stores.orders.clone()),
            registration: RegistrationService::new(stores.credentials.clone(), verifier),
            gatekeeper,
            started_at: Instant::now(),
            config: Arc::new(config),
            stores,
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        state.spawn_health_check_task();

        state
    }

    /// Ping every store once, bounded by the store timeout.
    pub async fn probe_stores(&self) -> StoreHealth {
        probe(&self.stores, self.config.store_timeout).await
    }

    /// Spawn the background store probe.
    ///
    /// Updates the `checkout_store_up` gauges and logs transitions, so an
    /// outage shows up before user requests start failing.
    fn spawn_health_check_task(&self) {
        let stores = self.stores.clone();
        let timeout = self.config.store_timeout;
        let interval_duration = self.config.health_check_interval;
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(interval_duration);
            let mut last: Option<StoreHealth> = None;

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Health check task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let health = probe(&stores, timeout).await;
                        if last != Some(health) {
                            if health.all_up() {
                                info!(?health, "Health check: all stores reachable");
                            } else {
                                warn!(?health, "Health check: store unreachable");
                            }
                        } else {
                            trace!("Health check: no change");
                        }
                        last = Some(health);
                    }
                }
            }

            debug!("Health check task shutting down");
        });
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

async fn probe(stores: &Stores, timeout: Duration) -> StoreHealth {
    let (counter, credentials, orders) = tokio::join!(
        tokio::time::timeout(timeout, stores.counter.ping()),
        tokio::time::timeout(timeout, stores.credentials.ping()),
        tokio::time::timeout(timeout, stores.orders.ping()),
    );

    let health = StoreHealth {
        counter: matches!(counter, Ok(Ok(()))),
        credentials: matches!(credentials, Ok(Ok(()))),
        orders: matches!(orders, Ok(Ok(()))),
    };

    metrics::set_store_up("counter", health.counter);
    metrics::set_store_up("credential", health.credentials);
    metrics::set_store_up("order", health.orders);

    health
}

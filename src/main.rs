use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use checkout::store::{
    InMemoryCounterStore, InMemoryCredentialStore, InMemoryOrderRepository, PgCredentialStore,
    PgOrderRepository, RedisCounterStore, connect_pool,
};
use checkout::{AppState, Config, Stores, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting checkout v{}", env!("CARGO_PKG_VERSION"));

    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        host = %config.host,
        port = %config.port,
        redis = config.redis_url.is_some(),
        postgres = config.database_url.is_some(),
        secret_scheme = %config.secret_scheme,
        "Configuration loaded"
    );

    if let Some(addr) = config.metrics_addr() {
        metrics::try_init_metrics(addr);
    }

    let stores = connect_stores(&config).await.map_err(|e| {
        error!("Failed to connect to stores: {e:#}");
        exitcode::UNAVAILABLE
    })?;

    let state = AppState::new(config.clone(), stores);
    let app = build_router(state.clone());

    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  POST   /register          - Register a user");
    info!("  GET    /health            - Health check");
    info!("  GET    /ready             - Readiness check");
    info!("  GET    /api/orders        - List orders");
    info!("  POST   /api/orders        - Create order");
    info!("  GET    /api/orders/{{id}}   - Get order");
    info!("  PUT    /api/orders/{{id}}   - Update order");
    info!("  DELETE /api/orders/{{id}}   - Delete order");

    axum::serve(listener, app)
        .with_graceful_shutdown(utils::shutdown_signal())
        .await
        .map_err(|e| {
            error!("Server error: {e}");
            exitcode::SOFTWARE
        })?;

    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Pick each store from configuration: external when a URL is set,
/// in-memory otherwise.
async fn connect_stores(config: &Config) -> anyhow::Result<Stores> {
    let counter: Arc<dyn checkout::store::CounterStore> = match &config.redis_url {
        Some(url) => {
            let store = RedisCounterStore::connect(url, config.store_timeout)
                .await
                .context("connecting to Redis counter store")?;
            info!("Using Redis counter store");
            Arc::new(store)
        }
        None => {
            warn!("REDIS_URL not set: rate limit counters are local to this instance");
            Arc::new(InMemoryCounterStore::new())
        }
    };

    let stores = match &config.database_url {
        Some(url) => {
            let pool = connect_pool(url, config.db_max_connections, config.store_timeout)
                .await
                .context("connecting to PostgreSQL")?;
            let pool = Arc::new(pool);
            info!(
                max_connections = config.db_max_connections,
                "Using PostgreSQL credential and order stores"
            );
            Stores {
                counter,
                credentials: Arc::new(PgCredentialStore::new(pool.clone())),
                orders: Arc::new(PgOrderRepository::new(pool)),
            }
        }
        None => {
            warn!("DATABASE_URL not set: credentials and orders are kept in memory");
            Stores {
                counter,
                credentials: Arc::new(InMemoryCredentialStore::new()),
                orders: Arc::new(InMemoryOrderRepository::new()),
            }
        }
    };

    Ok(stores)
}

//! # Checkout
//!
//! Order management service behind a gatekeeper pipeline:
//!
//! - **Rate limiting**: one global fixed window, counted in a shared store
//!   (Redis) so every instance enforces the same ceiling
//! - **Authentication**: HTTP Basic against a credential store (PostgreSQL),
//!   secrets sealed with Argon2id
//! - **Idempotent creation**: a repeated order id is rejected, never overwritten
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Error Path → CORS → Request ID → Trace)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Gatekeeper (FixedWindowLimiter → Authenticator)            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (register, orders, health)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Services (RegistrationService, OrderService)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Stores (CounterStore, CredentialStore, OrderRepository)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use checkout::store::{InMemoryCounterStore, InMemoryCredentialStore, InMemoryOrderRepository};
//! use checkout::{AppState, Config, Stores, build_router};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let stores = Stores {
//!         counter: Arc::new(InMemoryCounterStore::new()),
//!         credentials: Arc::new(InMemoryCredentialStore::new()),
//!         orders: Arc::new(InMemoryOrderRepository::new()),
//!     };
//!
//!     let state = AppState::new(config, stores);
//!     let app = build_router(state);
//!
//!     // Start the server...
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod utils;

// Re-exports for convenience
pub use config::{Config, SecretScheme};
pub use error::{AppError, AppResult, ErrorBody};
pub use gate::{Gatekeeper, Identity};
pub use routes::build_router;
pub use state::{AppState, Stores};

//! HTTP middleware.
//!
//! # Architecture
//!
//! ```text
//! Request → Error Path → CORS → Request ID → Trace → Gatekeeper → Handler
//!                                                    (rate limit → auth)
//!                                                       ↓         ↓
//!                                                  429 / 503  401 / 400
//! ```
//!
//! Request IDs, CORS and tracing come from `tower-http`; the two layers here
//! are specific to this service.

pub mod error_path;
pub mod gatekeeper;

pub use error_path::ErrorPathLayer;
pub use gatekeeper::GatekeeperLayer;

//! Storage capabilities used by the gatekeeper and the order API.
//!
//! Each store is an injected trait object so the same pipeline runs against
//! Redis/PostgreSQL in production and in-process maps in tests:
//!
//! - [`CounterStore`]: shared counters with atomic increment and expiry
//!   (Redis, or [`InMemoryCounterStore`])
//! - [`CredentialStore`]: username → sealed secret (PostgreSQL, or
//!   [`InMemoryCredentialStore`])
//! - [`OrderRepository`]: orders keyed by client-assigned id (PostgreSQL, or
//!   [`InMemoryOrderRepository`])
//!
//! Uniqueness of usernames and order ids is the store's job. Callers never
//! rely on a read-then-write sequence to keep duplicates out.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Credential, Order, OrderId};

pub mod memory;
pub mod postgres;
pub mod redis;

pub use memory::{InMemoryCounterStore, InMemoryCredentialStore, InMemoryOrderRepository};
pub use postgres::{PgCredentialStore, PgOrderRepository, connect_pool};
pub use redis::RedisCounterStore;

/// Failure reported by any store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached or did not answer in time.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend answered with an error.
    #[error("store query failed: {0}")]
    Query(String),
}

/// Shared counter capability behind the fixed-window rate limiter.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment `key` by one and return the post-increment value.
    ///
    /// A missing key starts from zero, so the first caller observes `1`.
    async fn increment(&self, key: &str) -> Result<i64, StoreError>;

    /// Expire `key` after `ttl`.
    async fn expire_after(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Round-trip check used by health probes.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Username → credential lookup.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find the credential registered under exactly `username`.
    async fn find(&self, username: &str) -> Result<Option<Credential>, StoreError>;

    /// Insert `credential` unless the username is taken.
    ///
    /// Returns `false` when a credential with the same username already
    /// exists; the existing one is left untouched.
    async fn insert_if_absent(&self, credential: &Credential) -> Result<bool, StoreError>;

    /// Round-trip check used by health probes.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Order persistence with create-if-absent semantics.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert `order` if its id is free.
    ///
    /// Returns the stored record and whether this call created it. When the
    /// id is taken the stored record is returned unchanged with `false`.
    async fn create_if_absent(&self, order: Order) -> Result<(Order, bool), StoreError>;

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>, StoreError>;

    /// All orders, ordered by id.
    async fn list(&self) -> Result<Vec<Order>, StoreError>;

    /// Replace an existing order. Returns `None` if no order has that id.
    async fn update(&self, order: Order) -> Result<Option<Order>, StoreError>;

    /// Delete by id. Returns `false` if nothing was deleted.
    async fn delete(&self, order_id: OrderId) -> Result<bool, StoreError>;

    /// Round-trip check used by health probes.
    async fn ping(&self) -> Result<(), StoreError>;
}

//! In-process store implementations.
//!
//! Used when `REDIS_URL` / `DATABASE_URL` are not configured and as
//! deterministic stores in tests. All three serialize writers behind a single
//! lock, which gives the same atomicity guarantees the external stores give
//! through `INCR` and unique constraints, but only within one process.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{CounterStore, CredentialStore, OrderRepository, StoreError};
use crate::models::{Credential, Order, OrderId};

/// Counter value with optional expiration.
#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    value: i64,
    expires_at: Option<Instant>,
}

impl CounterEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Increments between sweeps of expired counters.
const SWEEP_EVERY: u64 = 256;

/// Counter store for single-instance deployments and tests.
///
/// A key that is incremented again after expiring restarts at zero. Keys of
/// past windows are never touched again, so `increment` also sweeps every
/// expired counter once per [`SWEEP_EVERY`] calls.
#[derive(Clone, Default)]
pub struct InMemoryCounterStore {
    counters: Arc<RwLock<HashMap<String, CounterEntry>>>,
    increments: Arc<AtomicU64>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current live value of `key`, if any.
    pub async fn value(&self, key: &str) -> Option<i64> {
        let now = Instant::now();
        self.counters
            .read()
            .await
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value)
    }

    /// Remaining time to live of `key`, if it has one.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.counters
            .read()
            .await
            .get(key)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Number of keys held, expired or not.
    pub async fn key_count(&self) -> usize {
        self.counters.read().await.len()
    }

    /// Drop every expired counter. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut counters = self.counters.write().await;
        let before = counters.len();
        counters.retain(|_, entry| !entry.is_expired(now));
        before - counters.len()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut counters = self.counters.write().await;

        if self.increments.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            counters.retain(|_, entry| !entry.is_expired(now));
        }

        let entry = counters.entry(key.to_string()).or_insert(CounterEntry {
            value: 0,
            expires_at: None,
        });
        if entry.is_expired(now) {
            *entry = CounterEntry {
                value: 0,
                expires_at: None,
            };
        }
        entry.value += 1;

        Ok(entry.value)
    }

    async fn expire_after(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut counters = self.counters.write().await;
        if let Some(entry) = counters.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Credential store backed by a map keyed by username.
#[derive(Clone, Default)]
pub struct InMemoryCredentialStore {
    credentials: Arc<RwLock<HashMap<String, Credential>>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find(&self, username: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self.credentials.read().await.get(username).cloned())
    }

    async fn insert_if_absent(&self, credential: &Credential) -> Result<bool, StoreError> {
        let mut credentials = self.credentials.write().await;
        if credentials.contains_key(&credential.username) {
            return Ok(false);
        }
        credentials.insert(credential.username.clone(), credential.clone());
        Ok(true)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Order repository backed by an ordered map.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<BTreeMap<OrderId, Order>>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create_if_absent(&self, order: Order) -> Result<(Order, bool), StoreError> {
        let mut orders = self.orders.write().await;
        if let Some(existing) = orders.get(&order.order_id) {
            return Ok((existing.clone(), false));
        }
        orders.insert(order.order_id, order.clone());
        Ok((order, true))
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.get(&order_id).cloned())
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self.orders.read().await.values().cloned().collect())
    }

    async fn update(&self, order: Order) -> Result<Option<Order>, StoreError> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&order.order_id) {
            Some(slot) => {
                *slot = order.clone();
                Ok(Some(order))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, order_id: OrderId) -> Result<bool, StoreError> {
        Ok(self.orders.write().await.remove(&order_id).is_some())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

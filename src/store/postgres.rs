//! PostgreSQL credential store and order repository.
//!
//! Uniqueness comes from the table constraints, and both create paths use
//! `ON CONFLICT DO NOTHING`, so two concurrent registrations of one username
//! (or two creates of one order id) resolve to exactly one winner.
//!
//! Expected schema (migrations are managed outside this service):
//!
//! ```sql
//! CREATE TABLE users (
//!     username TEXT PRIMARY KEY,
//!     secret   TEXT NOT NULL
//! );
//!
//! CREATE TABLE orders (
//!     order_id     BIGINT PRIMARY KEY,
//!     customer     TEXT NOT NULL,
//!     product_name TEXT NOT NULL,
//!     quantity     INTEGER NOT NULL,
//!     unit_price   NUMERIC(12, 2) NOT NULL,
//!     order_date   TEXT NOT NULL,
//!     priority     TEXT NOT NULL
//! );
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::{CredentialStore, OrderRepository, StoreError};
use crate::models::{Credential, Order, OrderId};

const ORDER_COLUMNS: &str =
    "order_id, customer, product_name, quantity, unit_price, order_date, priority";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => StoreError::Unavailable(err.to_string()),
            _ => StoreError::Query(err.to_string()),
        }
    }
}

/// Open a connection pool.
///
/// `acquire_timeout` bounds how long a request waits for a connection; when
/// it elapses the request fails with [`StoreError::Unavailable`].
pub async fn connect_pool(
    url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(url)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            StoreError::from(e)
        })
}

/// SQLx implementation of the credential store.
pub struct PgCredentialStore {
    pool: Arc<PgPool>,
}

impl PgCredentialStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    #[tracing::instrument(skip(self))]
    async fn find(&self, username: &str) -> Result<Option<Credential>, StoreError> {
        sqlx::query_as::<_, Credential>("SELECT username, secret FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Database error finding credential");
                StoreError::from(e)
            })
    }

    #[tracing::instrument(skip(self, credential), fields(username = %credential.username))]
    async fn insert_if_absent(&self, credential: &Credential) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO users (username, secret) VALUES ($1, $2) \
             ON CONFLICT (username) DO NOTHING",
        )
        .bind(&credential.username)
        .bind(&credential.secret)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Database error registering credential");
            StoreError::from(e)
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&*self.pool).await?;
        Ok(())
    }
}

/// SQLx implementation of the order repository.
pub struct PgOrderRepository {
    pool: Arc<PgPool>,
}

impl PgOrderRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    #[tracing::instrument(skip(self, order), fields(order_id = order.order_id))]
    async fn create_if_absent(&self, order: Order) -> Result<(Order, bool), StoreError> {
        let inserted = sqlx::query_as::<_, Order>(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (order_id) DO NOTHING RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.order_id)
        .bind(&order.customer)
        .bind(&order.product_name)
        .bind(order.quantity)
        .bind(order.unit_price)
        .bind(&order.order_date)
        .bind(&order.priority)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Database error creating order");
            StoreError::from(e)
        })?;

        if let Some(created) = inserted {
            return Ok((created, true));
        }

        // Lost the race or a plain duplicate: report what is stored.
        match self.get(order.order_id).await? {
            Some(existing) => Ok((existing, false)),
            None => Err(StoreError::Query(format!(
                "order {} conflicted on insert but no longer exists",
                order.order_id
            ))),
        }
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(order)
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY order_id"
        ))
        .fetch_all(&*self.pool)
        .await?;
        Ok(orders)
    }

    #[tracing::instrument(skip(self, order), fields(order_id = order.order_id))]
    async fn update(&self, order: Order) -> Result<Option<Order>, StoreError> {
        let updated = sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders SET customer = $2, product_name = $3, quantity = $4, \
             unit_price = $5, order_date = $6, priority = $7 \
             WHERE order_id = $1 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.order_id)
        .bind(&order.customer)
        .bind(&order.product_name)
        .bind(order.quantity)
        .bind(order.unit_price)
        .bind(&order.order_date)
        .bind(&order.priority)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Database error updating order");
            StoreError::from(e)
        })?;
        Ok(updated)
    }

    async fn delete(&self, order_id: OrderId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM orders WHERE order_id = $1")
            .bind(order_id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&*self.pool).await?;
        Ok(())
    }
}

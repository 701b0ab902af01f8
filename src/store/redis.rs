//! Redis counter store shared by every service instance.
//!
//! `INCR` is atomic on the server, so concurrent first requests in a window
//! observe distinct values and only one of them sees `1` and sets the expiry.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ErrorKind, RedisError};
use tracing::{debug, warn};

use super::{CounterStore, StoreError};

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        match err.kind() {
            ErrorKind::TypeError | ErrorKind::ResponseError => StoreError::Query(err.to_string()),
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

/// Counter store on top of a Redis connection manager.
///
/// The connection manager reconnects on its own; each call is additionally
/// bounded by `op_timeout` so a hung server turns into
/// [`StoreError::Unavailable`] instead of a stuck request.
#[derive(Clone)]
pub struct RedisCounterStore {
    connection_manager: ConnectionManager,
    op_timeout: Duration,
}

impl RedisCounterStore {
    /// Connect to `url` and verify the connection with `PING`.
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| {
            warn!(error = %e, "Invalid Redis URL for counter store");
            StoreError::Unavailable(format!("failed to create Redis client: {e}"))
        })?;

        let connection_manager =
            tokio::time::timeout(op_timeout, ConnectionManager::new(client))
                .await
                .map_err(|_| StoreError::Unavailable("timed out connecting to Redis".into()))??;

        let store = Self {
            connection_manager,
            op_timeout,
        };
        store.ping().await?;

        debug!("Connected to Redis counter store");
        Ok(store)
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, RedisError>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Unavailable(format!(
                "Redis {op} timed out after {:?}",
                self.op_timeout
            ))),
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.connection_manager.clone();
        self.bounded("INCR", async move { conn.incr(key, 1i64).await })
            .await
    }

    async fn expire_after(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection_manager.clone();
        let seconds = i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX);
        let _applied: bool = self
            .bounded("EXPIRE", async move { conn.expire(key, seconds).await })
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection_manager.clone();
        let _pong: String = self
            .bounded("PING", async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_are_unavailability() {
        let err = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(matches!(StoreError::from(err), StoreError::Unavailable(_)));
    }

    #[test]
    fn test_type_errors_are_query_failures() {
        let err = RedisError::from((ErrorKind::TypeError, "not an integer"));
        assert!(matches!(StoreError::from(err), StoreError::Query(_)));
    }
}

//! Redis-backed implementation of the [`KeyValueStore`] trait.

use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};

use crate::persistence::{error::PersistenceError, traits::KeyValueStore};

/// A key-value store backed by a Redis connection manager.
///
/// The connection manager reconnects transparently after transient failures,
/// so a lost connection surfaces as per-call errors rather than a dead
/// client. Every call is bounded by `op_timeout`.
pub struct RedisKeyValueStore {
    manager: ConnectionManager,
    op_timeout: Duration,
}

impl RedisKeyValueStore {
    /// Connects to the Redis instance at `url`.
    ///
    /// Fails fast (within `op_timeout`) when the instance is unreachable so
    /// the caller can degrade to the in-process fallback at startup.
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, PersistenceError> {
        let client = redis::Client::open(url)?;
        let manager = tokio::time::timeout(op_timeout, client.get_connection_manager())
            .await
            .map_err(|_| PersistenceError::Timeout(format!("connect to {url}")))??;
        Ok(Self { manager, op_timeout })
    }

    async fn bounded<T>(
        &self,
        what: &str,
        fut: impl std::future::Future<Output = Result<T, redis::RedisError>>,
    ) -> Result<T, PersistenceError> {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| PersistenceError::Timeout(what.to_string()))?
            .map_err(PersistenceError::from)
    }
}

#[async_trait]
impl KeyValueStore for RedisKeyValueStore {
    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), PersistenceError> {
        let mut conn = self.manager.clone();
        // SET with EX is atomic on the server side.
        let seconds = ttl.as_secs().max(1);
        self.bounded("SET EX", conn.set_ex::<_, _, ()>(key, value, seconds)).await
    }

    async fn exists(&self, key: &str) -> Result<bool, PersistenceError> {
        let mut conn = self.manager.clone();
        self.bounded("EXISTS", conn.exists::<_, bool>(key)).await
    }

    async fn ping(&self) -> Result<(), PersistenceError> {
        let mut conn = self.manager.clone();
        self.bounded("PING", async move {
            redis::cmd("PING").query_async::<String>(&mut conn).await
        })
        .await
        .map(|_| ())
    }
}

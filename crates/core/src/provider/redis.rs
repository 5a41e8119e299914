//! Redis-backed provider for caches shared between processes.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::StorageProvider;
use crate::StorageError;

/// Networked key-value provider.
///
/// Holds a [`ConnectionManager`], which reconnects on its own and is cheap
/// to clone.
#[derive(Clone)]
pub struct RedisProvider {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisProvider {
    /// Connect to `url` and verify the server answers a PING.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(url).map_err(|e| StorageError::Unavailable(e.to_string()))?;
        let mut conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StorageError::Unavailable(format!("redis connection error: {e}")))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::Unavailable(format!("redis ping failed: {e}")))?;

        tracing::debug!("redis provider connected");

        Ok(Self { conn, prefix: String::new() })
    }

    /// Namespace every key with `prefix`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn full_key(&self, key: &str) -> String {
        namespaced(&self.prefix, key)
    }
}

fn namespaced(prefix: &str, key: &str) -> String {
    format!("{prefix}{key}")
}

/// Expiry in milliseconds for `PSETEX`, or `None` to store without one.
///
/// Sub-millisecond hints round up to 1ms since Redis rejects a zero expiry.
fn expiry_millis(ttl_hint: Duration) -> Option<u64> {
    if ttl_hint.is_zero() {
        return None;
    }
    Some(u64::try_from(ttl_hint.as_millis()).unwrap_or(u64::MAX).max(1))
}

#[async_trait]
impl StorageProvider for RedisProvider {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn
            .get(self.full_key(key))
            .await
            .map_err(|e| StorageError::Backend(format!("redis get error: {e}")))?;

        Ok(value.filter(|v| !v.is_empty()).map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl_hint: Duration) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let key = self.full_key(key);

        let millis = expiry_millis(ttl_hint);

        let result = match millis {
            None => conn.set::<_, _, ()>(&key, value.as_ref()).await,
            Some(millis) => conn.pset_ex::<_, _, ()>(&key, value.as_ref(), millis).await,
        };

        result.map_err(|e| StorageError::Backend(format!("redis set error: {e}")))?;
        tracing::debug!(key = %key, ttl_ms = millis.unwrap_or(0), "redis provider set");
        Ok(())
    }
}

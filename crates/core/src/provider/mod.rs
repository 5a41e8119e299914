//! Storage provider contract and reference backends.
//!
//! The cache hands providers opaque bytes under a string key. Providers know
//! nothing about the entry schema; freshness is the entry's own concern.
//!
//! - [`MemoryProvider`]: volatile in-process map
//! - [`SqliteProvider`]: persistent key-value table on SQLite
//! - `RedisProvider` (feature `redis`): networked key-value service

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::StorageError;

pub use memory::MemoryProvider;
#[cfg(feature = "redis")]
pub use redis::RedisProvider;
pub use sqlite::SqliteProvider;

/// Minimal get/set persistence used by the cache.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Value stored under `key`.
    ///
    /// Returns `Ok(None)` when nothing is stored. Errors are reserved for
    /// communication or integrity failures.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError>;

    /// Store `value` under `key`.
    ///
    /// `ttl_hint` of [`Duration::ZERO`] means the provider enforces no expiry.
    async fn set(&self, key: &str, value: Bytes, ttl_hint: Duration) -> Result<(), StorageError>;
}

#[async_trait]
impl<T: StorageProvider + ?Sized> StorageProvider for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl_hint: Duration) -> Result<(), StorageError> {
        (**self).set(key, value, ttl_hint).await
    }
}

#[async_trait]
impl<T: StorageProvider + ?Sized> StorageProvider for Box<T> {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl_hint: Duration) -> Result<(), StorageError> {
        (**self).set(key, value, ttl_hint).await
    }
}

//! Volatile in-process provider.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::StorageProvider;
use crate::StorageError;

/// In-memory key-value map.
///
/// Uses a HashMap behind a tokio RwLock. TTL hints are ignored; values live
/// until overwritten or the provider is dropped. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    data: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        let data = self.data.read().await;
        Ok(data.get(key).filter(|v| !v.is_empty()).cloned())
    }

    async fn set(&self, key: &str, value: Bytes, _ttl_hint: Duration) -> Result<(), StorageError> {
        let mut data = self.data.write().await;
        data.insert(key.to_string(), value);
        Ok(())
    }
}

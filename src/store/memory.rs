use crate::core::cache::{CacheBackend, CacheEntry, CacheKey};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory cache backend, used for tests and `backend: memory`.
pub struct MemoryBackend {
    inner: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let cache = self.inner.lock().await;
        let entry = cache.get(key).cloned();
        if entry.is_none() {
            debug!("Cache MISS for key: {}", key);
        }
        entry
    }

    async fn put(&self, key: &CacheKey, entry: &CacheEntry) {
        let mut cache = self.inner.lock().await;
        cache.insert(key.clone(), entry.clone());
    }
}

use crate::core::cache::{CacheBackend, CacheEntry, CacheKey};
use anyhow::Result;
use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use std::path::Path;
use tracing::debug;

const PARTITION: &str = "history";

/// Persists cache entries in a fjall partition, keyed by `<coin_id>_<days>days`.
pub struct FjallBackend {
    _keyspace: Keyspace,
    partition: PartitionHandle,
}

impl FjallBackend {
    pub fn new(db_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(db_path)?;

        let keyspace = Config::new(db_path.join("fjall_db")).open()?;
        let partition = keyspace.open_partition(PARTITION, PartitionCreateOptions::default())?;
        Ok(Self {
            _keyspace: keyspace,
            partition,
        })
    }
}

#[async_trait]
impl CacheBackend for FjallBackend {
    async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let res: Result<Option<CacheEntry>> = (|| {
            match self.partition.get(key.to_string())? {
                Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
                None => Ok(None),
            }
        })();

        match res {
            Ok(Some(entry)) => Some(entry),
            Ok(None) => {
                debug!("Cache MISS for key: {}", key);
                None
            }
            Err(e) => {
                debug!("FjallBackend get error: {}", e);
                None
            }
        }
    }

    async fn put(&self, key: &CacheKey, entry: &CacheEntry) {
        let res: Result<()> = (|| {
            self.partition
                .insert(key.to_string(), serde_json::to_vec(entry)?)?;
            Ok(())
        })();
        if let Err(e) = res {
            debug!("FjallBackend put error: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::price::PricePoint;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_fjall_get_put() {
        let dir = tempdir().unwrap();
        let backend = FjallBackend::new(dir.path()).unwrap();
        let key = CacheKey::new("bitcoin", 60);

        assert!(backend.get(&key).await.is_none());

        let entry = CacheEntry {
            fetched_at: 1_700_000_000,
            series: vec![PricePoint::new(1_700_000_000_000, 36512.25)],
        };
        backend.put(&key, &entry).await;

        assert_eq!(backend.get(&key).await, Some(entry));
        assert!(backend.get(&CacheKey::new("bitcoin", 7)).await.is_none());
    }
}

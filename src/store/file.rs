use crate::core::cache::{CacheBackend, CacheEntry, CacheKey};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One JSON file per key: `<dir>/<coin_id>_<days>days.json`.
///
/// There is no locking; concurrent writers to the same key race and the last
/// write wins.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl CacheBackend for FileBackend {
    async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(_) => {
                debug!("Cache MISS for key: {}", key);
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Error loading cache for {}: {}", key, e);
                None
            }
        }
    }

    async fn put(&self, key: &CacheKey, entry: &CacheEntry) {
        let path = self.path_for(key);
        let res: Result<()> = async {
            let bytes = serde_json::to_vec(entry)?;
            tokio::fs::write(&path, bytes).await?;
            Ok(())
        }
        .await;
        if let Err(e) = res {
            warn!("Error writing cache file {}: {}", path.display(), e);
        }
    }
}

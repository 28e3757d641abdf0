pub mod disk;
pub mod file;
pub mod memory;

use crate::core::cache::CacheBackend;
use crate::core::config::{CacheBackendKind, CacheConfig};
use anyhow::{Context, Result};
use disk::FjallBackend;
use file::FileBackend;
use memory::MemoryBackend;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Opens the configured cache backend rooted at `dir`.
pub fn open_backend(config: &CacheConfig, dir: &Path) -> Result<Arc<dyn CacheBackend>> {
    debug!("Opening {:?} cache backend at {}", config.backend, dir.display());
    let backend: Arc<dyn CacheBackend> = match config.backend {
        CacheBackendKind::File => Arc::new(
            FileBackend::new(dir)
                .with_context(|| format!("Failed to open file cache at {}", dir.display()))?,
        ),
        CacheBackendKind::Fjall => Arc::new(
            FjallBackend::new(dir)
                .with_context(|| format!("Failed to open fjall cache at {}", dir.display()))?,
        ),
        CacheBackendKind::Memory => Arc::new(MemoryBackend::new()),
    };
    Ok(backend)
}

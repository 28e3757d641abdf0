use crate::core::cache::CacheStore;
use crate::core::config::AppConfig;
use crate::core::price::PriceSource;
use crate::providers::util::{RetryPolicy, build_client};
use crate::providers::{CoinApiProvider, CoinGeckoProvider};
use crate::store::open_backend;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

/// Providers and cache shared by every data-layer call. Built once, read-only after.
#[derive(Clone)]
pub struct DataContext {
    pub primary: Arc<dyn PriceSource>,
    /// Present only when credentials are configured.
    pub alternate: Option<Arc<dyn PriceSource>>,
    pub cache: CacheStore,
}

impl DataContext {
    pub fn new(
        primary: Arc<dyn PriceSource>,
        alternate: Option<Arc<dyn PriceSource>>,
        cache: CacheStore,
    ) -> Self {
        Self {
            primary,
            alternate,
            cache,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client =
            build_client(config.network.timeout()).context("Failed to build HTTP client")?;
        let retry = RetryPolicy::from_config(&config.network);

        let primary: Arc<dyn PriceSource> = Arc::new(CoinGeckoProvider::new(
            &config.providers.coingecko.base_url,
            client.clone(),
            retry,
        ));

        let alternate = config.coinapi_key().map(|key| {
            debug!("CoinAPI key present, alternate provider enabled");
            Arc::new(CoinApiProvider::new(
                &config.providers.coinapi.base_url,
                &key,
                client.clone(),
                retry,
                config.network.alternate_delay(),
            )) as Arc<dyn PriceSource>
        });

        let cache_dir = config.cache_dir()?;
        let backend = open_backend(&config.cache, &cache_dir)?;
        let cache = CacheStore::new(backend, config.ttl());

        Ok(Self::new(primary, alternate, cache))
    }

    /// Remote sources in the order they should be tried.
    pub fn sources(&self, allow_multi_source: bool) -> Vec<Arc<dyn PriceSource>> {
        let mut sources = vec![Arc::clone(&self.primary)];
        if allow_multi_source {
            sources.extend(self.alternate.iter().cloned());
        }
        sources
    }
}

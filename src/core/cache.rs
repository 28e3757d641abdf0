use crate::core::price::PriceSeries;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use tracing::debug;

/// Identifies one cached history window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub coin_id: String,
    pub days: u32,
}

impl CacheKey {
    pub fn new(coin_id: &str, days: u32) -> Self {
        Self {
            coin_id: coin_id.to_string(),
            days,
        }
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}days", self.coin_id, self.days)
    }
}

/// The persisted record: `{"fetchedAt": <epoch s>, "series": [[ms, price], ...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub fetched_at: i64,
    pub series: PriceSeries,
}

impl CacheEntry {
    pub fn new(series: PriceSeries, fetched_at: DateTime<Utc>) -> Self {
        Self {
            fetched_at: fetched_at.timestamp(),
            series,
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.timestamp() - self.fetched_at < ttl.num_seconds()
    }
}

/// Raw storage for cache entries. Implementations are best-effort: failures
/// are logged and surface as misses.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Option<CacheEntry>;
    async fn put(&self, key: &CacheKey, entry: &CacheEntry);
}

/// TTL-aware view over a [`CacheBackend`].
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    #[cfg(test)]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, key: &CacheKey) -> Option<PriceSeries> {
        self.get_at(key, Utc::now()).await
    }

    pub async fn get_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<PriceSeries> {
        let entry = self.backend.get(key).await?;
        if !entry.is_fresh(now, self.ttl) {
            debug!("Cache entry expired for key: {}", key);
            return None;
        }
        debug!("Cache HIT for key: {}", key);
        Some(entry.series)
    }

    pub async fn put(&self, key: &CacheKey, series: &PriceSeries) {
        let entry = CacheEntry::new(series.clone(), Utc::now());
        self.backend.put(key, &entry).await;
        debug!("Cache PUT for key: {}", key);
    }

    /// Latest cached price in the given window, if the entry is still fresh.
    pub async fn latest_price(&self, coin_id: &str, days: u32) -> Option<f64> {
        self.get(&CacheKey::new(coin_id, days))
            .await
            .and_then(|series| series.last().map(|p| p.price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::price::PricePoint;
    use crate::store::memory::MemoryBackend;

    fn store() -> (Arc<MemoryBackend>, CacheStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = CacheStore::new(backend.clone(), Duration::hours(24));
        (backend, store)
    }

    #[test]
    fn test_key_display_matches_file_stem() {
        assert_eq!(CacheKey::new("bitcoin", 60).to_string(), "bitcoin_60days");
    }

    #[test]
    fn test_entry_serializes_with_camel_case() {
        let entry = CacheEntry {
            fetched_at: 100,
            series: vec![PricePoint::new(1, 2.5)],
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"fetchedAt":100,"series":[[1,2.5]]}"#);
    }

    #[tokio::test]
    async fn test_fresh_entry_is_hit() {
        let (_, store) = store();
        let key = CacheKey::new("bitcoin", 7);
        let series = vec![PricePoint::new(1, 10.0), PricePoint::new(2, 11.0)];
        store.put(&key, &series).await;
        assert_eq!(store.get(&key).await, Some(series));
        assert_eq!(store.latest_price("bitcoin", 7).await, Some(11.0));
    }

    #[tokio::test]
    async fn test_entry_older_than_ttl_is_miss() {
        let (backend, store) = store();
        let key = CacheKey::new("bitcoin", 7);
        let stale = CacheEntry::new(
            vec![PricePoint::new(1, 10.0)],
            Utc::now() - Duration::hours(25),
        );
        backend.put(&key, &stale).await;
        assert!(store.get(&key).await.is_none());
        assert!(store.latest_price("bitcoin", 7).await.is_none());
    }

    #[tokio::test]
    async fn test_ttl_boundary_is_exclusive() {
        let (_, store) = store();
        let key = CacheKey::new("ethereum", 30);
        store.put(&key, &vec![PricePoint::new(1, 1.0)]).await;
        let now = Utc::now();
        assert!(store.get_at(&key, now + Duration::hours(23)).await.is_some());
        assert!(store.get_at(&key, now + Duration::hours(24) + Duration::seconds(1)).await.is_none());
    }
}

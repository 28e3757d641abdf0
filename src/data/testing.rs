use crate::core::cache::CacheStore;
use crate::core::coins::Coin;
use crate::core::context::DataContext;
use crate::core::price::{PricePoint, PriceSeries, PriceSource, ProviderError};
use crate::store::memory::MemoryBackend;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-process price source with canned answers and call counters.
#[derive(Default)]
pub struct FakeSource {
    pub name: &'static str,
    /// Keyed by symbol.
    pub prices: HashMap<String, f64>,
    /// Keyed by CoinGecko id.
    pub history: HashMap<String, PriceSeries>,
    pub price_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
}

impl FakeSource {
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    pub fn with_price(mut self, symbol: &str, price: f64) -> Self {
        self.prices.insert(symbol.to_string(), price);
        self
    }

    pub fn with_history(mut self, coin_id: &str, series: PriceSeries) -> Self {
        self.history.insert(coin_id.to_string(), series);
        self
    }

    pub fn calls(&self) -> usize {
        self.price_calls.load(Ordering::SeqCst) + self.history_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for FakeSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_current_prices(
        &self,
        coins: &[&'static Coin],
    ) -> Result<HashMap<String, f64>, ProviderError> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        if self.prices.is_empty() {
            return Err(ProviderError::NoData(self.name.to_string()));
        }
        Ok(coins
            .iter()
            .filter_map(|c| self.prices.get(c.symbol).map(|p| (c.symbol.to_string(), *p)))
            .collect())
    }

    async fn fetch_history(&self, coin: &Coin, _days: u32) -> Result<PriceSeries, ProviderError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.history
            .get(coin.coingecko_id)
            .cloned()
            .ok_or_else(|| ProviderError::NoData(coin.coingecko_id.to_string()))
    }
}

pub fn context(primary: Arc<FakeSource>, alternate: Option<Arc<FakeSource>>) -> DataContext {
    let cache = CacheStore::new(Arc::new(MemoryBackend::new()), chrono::Duration::hours(24));
    DataContext::new(
        primary,
        alternate.map(|a| a as Arc<dyn PriceSource>),
        cache,
    )
}

/// Daily series of `days` points ending today, following `f(day index)`.
pub fn daily_series(days: usize, f: impl Fn(usize) -> f64) -> PriceSeries {
    let today = chrono::Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default();
    (0..days)
        .map(|i| {
            let ts = today - (days - 1 - i) as i64 * 86_400_000;
            PricePoint::new(ts, f(i))
        })
        .collect()
}

use crate::core::coins::Coin;
use crate::core::price::{PricePoint, PriceSeries, PriceSource, ProviderError, sanitize_series};
use crate::providers::util::{RetryPolicy, fetch_json};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const API_KEY_HEADER: &str = "X-CoinAPI-Key";

/// Alternate provider. Needs an API key and has no batch endpoint, so current
/// prices are requested one coin at a time with a pause in between.
pub struct CoinApiProvider {
    base_url: String,
    api_key: String,
    client: Client,
    retry: RetryPolicy,
    call_delay: Duration,
}

impl CoinApiProvider {
    pub fn new(
        base_url: &str,
        api_key: &str,
        client: Client,
        retry: RetryPolicy,
        call_delay: Duration,
    ) -> Self {
        CoinApiProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
            retry,
            call_delay,
        }
    }

    async fn fetch_rate(&self, coin: &Coin) -> Result<f64, ProviderError> {
        let url = format!("{}/v1/exchangerate/{}/USD", self.base_url, coin.symbol);
        let headers = [(API_KEY_HEADER, self.api_key.as_str())];
        let rate: ExchangeRate = fetch_json(&self.client, &self.retry, &url, &headers).await?;
        Ok(rate.rate)
    }
}

#[derive(Deserialize, Debug)]
struct ExchangeRate {
    rate: f64,
}

#[derive(Deserialize, Debug)]
struct HistoryItem {
    time_period_start: String,
    rate_close: Option<f64>,
}

fn items_to_series(items: Vec<HistoryItem>) -> PriceSeries {
    let points = items
        .into_iter()
        .filter_map(|item| {
            let ts = DateTime::parse_from_rfc3339(&item.time_period_start).ok()?;
            Some(PricePoint::new(ts.timestamp_millis(), item.rate_close?))
        })
        .collect();
    sanitize_series(points)
}

#[async_trait]
impl PriceSource for CoinApiProvider {
    fn name(&self) -> &'static str {
        "coinapi"
    }

    #[instrument(name = "CoinApiPriceFetch", skip(self, coins), fields(count = coins.len()))]
    async fn fetch_current_prices(
        &self,
        coins: &[&'static Coin],
    ) -> Result<HashMap<String, f64>, ProviderError> {
        let mut prices = HashMap::new();
        let mut last_err = None;
        for (i, coin) in coins.iter().enumerate() {
            if i > 0 && !self.call_delay.is_zero() {
                tokio::time::sleep(self.call_delay).await;
            }
            match self.fetch_rate(coin).await {
                Ok(rate) => {
                    prices.insert(coin.symbol.to_string(), rate);
                }
                Err(e) => {
                    warn!("CoinAPI price for {} failed: {}", coin.symbol, e);
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) if prices.is_empty() => Err(e),
            _ => Ok(prices),
        }
    }

    #[instrument(name = "CoinApiHistoryFetch", skip(self), fields(coin = %coin.symbol))]
    async fn fetch_history(&self, coin: &Coin, days: u32) -> Result<PriceSeries, ProviderError> {
        let end = Utc::now();
        let start = end - chrono::Duration::days(i64::from(days));
        let url = format!(
            "{}/v1/exchangerate/{}/USD/history?period_id=1DAY&time_start={}&time_end={}",
            self.base_url,
            coin.symbol,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        );
        let headers = [(API_KEY_HEADER, self.api_key.as_str())];
        let items: Vec<HistoryItem> = fetch_json(&self.client, &self.retry, &url, &headers).await?;
        let series = items_to_series(items);
        if series.is_empty() {
            return Err(ProviderError::NoData(coin.symbol.to_string()));
        }
        debug!(points = series.len(), "Received CoinAPI history");
        Ok(series)
    }
}

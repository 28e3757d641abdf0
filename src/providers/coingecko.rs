use crate::core::coins::Coin;
use crate::core::price::{PricePoint, PriceSeries, PriceSource, ProviderError, sanitize_series};
use crate::providers::util::{RetryPolicy, fetch_json};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Primary market-data provider. Current prices are fetched in one batched call.
pub struct CoinGeckoProvider {
    base_url: String,
    client: Client,
    retry: RetryPolicy,
}

impl CoinGeckoProvider {
    pub fn new(base_url: &str, client: Client, retry: RetryPolicy) -> Self {
        CoinGeckoProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            retry,
        }
    }
}

#[derive(Deserialize, Debug)]
struct SimplePrice {
    usd: Option<f64>,
}

#[derive(Deserialize, Debug)]
struct MarketChart {
    #[serde(default)]
    prices: Vec<(f64, Option<f64>)>,
}

fn chart_to_series(chart: MarketChart) -> PriceSeries {
    let points = chart
        .prices
        .into_iter()
        .filter_map(|(ts, price)| price.map(|p| PricePoint::new(ts as i64, p)))
        .collect();
    sanitize_series(points)
}

#[async_trait]
impl PriceSource for CoinGeckoProvider {
    fn name(&self) -> &'static str {
        "coingecko"
    }

    #[instrument(name = "CoinGeckoPriceFetch", skip(self, coins), fields(count = coins.len()))]
    async fn fetch_current_prices(
        &self,
        coins: &[&'static Coin],
    ) -> Result<HashMap<String, f64>, ProviderError> {
        if coins.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<&str> = coins.iter().map(|c| c.coingecko_id).collect();
        let url = format!(
            "{}/api/v3/simple/price?ids={}&vs_currencies=usd",
            self.base_url,
            ids.join("%2C")
        );

        let data: HashMap<String, SimplePrice> =
            fetch_json(&self.client, &self.retry, &url, &[]).await?;
        debug!(received = data.len(), "Received CoinGecko prices");

        let prices = coins
            .iter()
            .filter_map(|coin| {
                data.get(coin.coingecko_id)
                    .and_then(|p| p.usd)
                    .map(|price| (coin.symbol.to_string(), price))
            })
            .collect();
        Ok(prices)
    }

    #[instrument(name = "CoinGeckoHistoryFetch", skip(self), fields(coin = %coin.coingecko_id))]
    async fn fetch_history(&self, coin: &Coin, days: u32) -> Result<PriceSeries, ProviderError> {
        let url = format!(
            "{}/api/v3/coins/{}/market_chart?vs_currency=usd&days={}",
            self.base_url, coin.coingecko_id, days
        );
        let chart: MarketChart = fetch_json(&self.client, &self.retry, &url, &[]).await?;
        let series = chart_to_series(chart);
        if series.is_empty() {
            return Err(ProviderError::NoData(coin.coingecko_id.to_string()));
        }
        debug!(points = series.len(), "Received CoinGecko history");
        Ok(series)
    }
}

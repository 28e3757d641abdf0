//! Historical prices per coin: cache first, then providers in order.

use crate::core::cache::CacheKey;
use crate::core::coins::{Coin, resolve};
use crate::core::context::DataContext;
use crate::core::price::{PriceSeries, PriceSource, sanitize_series};
use crate::data::matrix::PriceMatrix;
use std::sync::Arc;
use tracing::{debug, warn};

pub enum HistoryStrategy {
    Cache,
    Remote(Arc<dyn PriceSource>),
}

pub fn history_strategies(ctx: &DataContext, allow_multi_source: bool) -> Vec<HistoryStrategy> {
    let mut strategies = vec![HistoryStrategy::Cache];
    strategies.extend(
        ctx.sources(allow_multi_source)
            .into_iter()
            .map(HistoryStrategy::Remote),
    );
    strategies
}

/// First non-empty series from `strategies`. Provider results are written back to the cache.
pub async fn fetch_series(
    ctx: &DataContext,
    coin: &Coin,
    days: u32,
    strategies: &[HistoryStrategy],
) -> Option<PriceSeries> {
    let key = CacheKey::new(coin.coingecko_id, days);
    for strategy in strategies {
        match strategy {
            HistoryStrategy::Cache => {
                if let Some(series) = ctx.cache.get(&key).await {
                    let series = sanitize_series(series);
                    if !series.is_empty() {
                        return Some(series);
                    }
                }
            }
            HistoryStrategy::Remote(source) => match source.fetch_history(coin, days).await {
                Ok(series) if !series.is_empty() => {
                    debug!(
                        "Fetched {} points for {} from {}",
                        series.len(),
                        coin.symbol,
                        source.name()
                    );
                    ctx.cache.put(&key, &series).await;
                    return Some(series);
                }
                Ok(_) => warn!("{} returned no history for {}", source.name(), coin.symbol),
                Err(e) => warn!("{} history for {} failed: {}", source.name(), coin.symbol, e),
            },
        }
    }
    None
}

/// Daily price matrix over the trailing `days` for `symbols`, plus the
/// symbols that could not be served. An empty matrix is a valid result.
///
/// `progress` is called once per symbol after it has been handled.
pub async fn get_historical_prices(
    ctx: &DataContext,
    symbols: &[String],
    days: u32,
    allow_multi_source: bool,
    progress: &(dyn Fn(&str) + Sync),
) -> (PriceMatrix, Vec<String>) {
    let (coins, mut missing) = resolve(symbols);
    let strategies = history_strategies(ctx, allow_multi_source);

    let mut collected = Vec::with_capacity(coins.len());
    for coin in coins {
        match fetch_series(ctx, coin, days, &strategies).await {
            Some(series) => collected.push((coin.symbol.to_string(), series)),
            None => {
                warn!("Could not fetch historical data for {}", coin.symbol);
                missing.push(coin.symbol.to_string());
            }
        }
        progress(coin.symbol);
    }

    let matrix = PriceMatrix::from_series(&collected).filled();
    debug!(
        rows = matrix.n_rows(),
        cols = matrix.n_cols(),
        missing = missing.len(),
        "Built price matrix"
    );
    (matrix, missing)
}

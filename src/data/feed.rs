//! Current prices with provider fallback and cache backfill.

use crate::core::coins::{Coin, resolve};
use crate::core::context::DataContext;
use crate::core::price::PriceSource;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Window whose cached history backs up missing live prices.
pub const FALLBACK_WINDOW_DAYS: u32 = 7;
/// Relative deviation from the cached price that is logged as suspicious.
const OUTLIER_DEVIATION: f64 = 0.5;

#[derive(Debug, Error, PartialEq)]
pub enum PriceValidationError {
    #[error("No price data available")]
    NoData,
    #[error("Missing prices for: {}", .0.join(", "))]
    Missing(Vec<String>),
    #[error("Invalid prices for: {}", .0.join(", "))]
    NonPositive(Vec<String>),
}

/// One step of live price acquisition, tried in order.
pub enum LiveStrategy {
    Remote(Arc<dyn PriceSource>),
    CachedHistory,
}

pub fn live_strategies(ctx: &DataContext, allow_multi_source: bool) -> Vec<LiveStrategy> {
    let mut strategies: Vec<LiveStrategy> = ctx
        .sources(allow_multi_source)
        .into_iter()
        .map(LiveStrategy::Remote)
        .collect();
    strategies.push(LiveStrategy::CachedHistory);
    strategies
}

/// Checks that every coin has a positive price. Large jumps against the cached
/// 7-day history are only logged.
pub async fn validate_prices(
    ctx: &DataContext,
    coins: &[&'static Coin],
    prices: &HashMap<String, f64>,
) -> Result<(), PriceValidationError> {
    if prices.is_empty() {
        return Err(PriceValidationError::NoData);
    }

    let missing: Vec<String> = coins
        .iter()
        .filter(|c| !prices.contains_key(c.symbol))
        .map(|c| c.symbol.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PriceValidationError::Missing(missing));
    }

    let invalid: Vec<String> = coins
        .iter()
        .filter(|c| prices.get(c.symbol).is_some_and(|p| !is_usable_price(*p)))
        .map(|c| c.symbol.to_string())
        .collect();
    if !invalid.is_empty() {
        return Err(PriceValidationError::NonPositive(invalid));
    }

    let mut outliers = Vec::new();
    for coin in coins {
        let Some(cached) = ctx
            .cache
            .latest_price(coin.coingecko_id, FALLBACK_WINDOW_DAYS)
            .await
        else {
            continue;
        };
        if let Some(current) = prices.get(coin.symbol) {
            if cached > 0.0 && (current - cached).abs() / cached > OUTLIER_DEVIATION {
                outliers.push(coin.symbol);
            }
        }
    }
    if !outliers.is_empty() {
        warn!("Possible price outliers detected for: {}", outliers.join(", "));
    }

    Ok(())
}

fn is_usable_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

async fn backfill_from_cache(
    ctx: &DataContext,
    coins: &[&'static Coin],
    prices: &mut HashMap<String, f64>,
) {
    for coin in coins {
        if prices.get(coin.symbol).copied().is_some_and(is_usable_price) {
            continue;
        }
        if let Some(price) = ctx
            .cache
            .latest_price(coin.coingecko_id, FALLBACK_WINDOW_DAYS)
            .await
        {
            debug!("Using cached price for {}", coin.symbol);
            prices.insert(coin.symbol.to_string(), price);
        }
    }
}

/// Best-effort current USD prices for the known symbols in `symbols`.
///
/// Never fails: provider faults are logged and the result holds only
/// symbols with a positive price.
pub async fn get_live_prices(
    ctx: &DataContext,
    symbols: &[String],
    allow_multi_source: bool,
) -> HashMap<String, f64> {
    let (coins, unknown) = resolve(symbols);
    if !unknown.is_empty() {
        debug!("Ignoring unsupported symbols: {}", unknown.join(", "));
    }
    if coins.is_empty() {
        return HashMap::new();
    }

    let mut prices: HashMap<String, f64> = HashMap::new();
    let mut accepted = false;
    for strategy in live_strategies(ctx, allow_multi_source) {
        match strategy {
            LiveStrategy::Remote(source) => {
                if accepted {
                    continue;
                }
                let fetched = match source.fetch_current_prices(&coins).await {
                    Ok(fetched) => fetched,
                    Err(e) => {
                        warn!("Price source {} failed: {}", source.name(), e);
                        continue;
                    }
                };
                match validate_prices(ctx, &coins, &fetched).await {
                    Ok(()) => {
                        info!("Using prices from {}", source.name());
                        prices = fetched;
                        accepted = true;
                    }
                    Err(e) => {
                        warn!("Prices from {} rejected: {}", source.name(), e);
                        if prices.is_empty() {
                            prices = fetched;
                        }
                    }
                }
            }
            LiveStrategy::CachedHistory => {
                let usable = prices.values().copied().filter(|p| is_usable_price(*p)).count();
                if usable < coins.len() {
                    warn!("Incomplete price data from APIs, using cached prices");
                    backfill_from_cache(ctx, &coins, &mut prices).await;
                }
            }
        }
    }

    if let Err(e) = validate_prices(ctx, &coins, &prices).await {
        error!("Could not get valid price data from any source: {}", e);
    }
    prices.retain(|_, p| is_usable_price(*p));
    prices
}

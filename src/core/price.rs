//! Pricing abstractions and core types

use crate::core::coins::Coin;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A single observation. Serialized as `[timestamp_ms, price]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(i64, f64)", into = "(i64, f64)")]
pub struct PricePoint {
    pub timestamp_ms: i64,
    pub price: f64,
}

impl PricePoint {
    pub fn new(timestamp_ms: i64, price: f64) -> Self {
        Self {
            timestamp_ms,
            price,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }

    /// UTC calendar day of this observation.
    pub fn date(&self) -> Option<NaiveDate> {
        DateTime::<Utc>::from_timestamp_millis(self.timestamp_ms).map(|dt| dt.date_naive())
    }
}

impl From<(i64, f64)> for PricePoint {
    fn from((timestamp_ms, price): (i64, f64)) -> Self {
        Self::new(timestamp_ms, price)
    }
}

impl From<PricePoint> for (i64, f64) {
    fn from(point: PricePoint) -> Self {
        (point.timestamp_ms, point.price)
    }
}

pub type PriceSeries = Vec<PricePoint>;

/// Keeps usable points only, ordered by time.
pub fn sanitize_series(mut series: PriceSeries) -> PriceSeries {
    series.retain(PricePoint::is_usable);
    series.sort_by_key(|p| p.timestamp_ms);
    series
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited after {attempts} attempts: {url}")]
    RateLimited { attempts: usize, url: String },

    #[error("request failed for {url}: {message}")]
    Request { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("failed to parse response from {url}: {message}")]
    Parse { url: String, message: String },

    #[error("no data returned for {0}")]
    NoData(String),
}

impl ProviderError {
    /// Transport failures, server errors and rate limits are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. } | ProviderError::Request { .. } => true,
            ProviderError::Status { status, .. } => *status >= 500,
            ProviderError::Parse { .. } | ProviderError::NoData(_) => false,
        }
    }
}

/// Uniform contract over external market-data providers.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Current USD prices keyed by coin symbol. Coins the provider does not
    /// know are absent from the map.
    async fn fetch_current_prices(
        &self,
        coins: &[&'static Coin],
    ) -> Result<HashMap<String, f64>, ProviderError>;

    /// Historical USD prices over the trailing `days`.
    async fn fetch_history(&self, coin: &Coin, days: u32) -> Result<PriceSeries, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_point_serializes_as_pair() {
        let point = PricePoint::new(1_700_000_000_000, 42.5);
        let json = serde_json::to_string(&point).unwrap();
        assert_eq!(json, "[1700000000000,42.5]");
        let back: PricePoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, point);
    }

    #[test]
    fn test_sanitize_drops_unusable_and_sorts() {
        let series = vec![
            PricePoint::new(3, 3.0),
            PricePoint::new(1, 0.0),
            PricePoint::new(2, f64::NAN),
            PricePoint::new(0, 1.0),
        ];
        let cleaned = sanitize_series(series);
        assert_eq!(cleaned, vec![PricePoint::new(0, 1.0), PricePoint::new(3, 3.0)]);
    }

    #[test]
    fn test_point_date_is_utc() {
        // 2024-01-01T23:30:00Z
        let point = PricePoint::new(1_704_151_800_000, 1.0);
        assert_eq!(point.date(), NaiveDate::from_ymd_opt(2024, 1, 1));
    }
}

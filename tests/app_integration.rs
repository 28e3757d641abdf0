use coinfolio::core::DataContext;
use coinfolio::core::config::AppConfig;
use coinfolio::data::get_historical_prices;
use coinfolio::optimize::{FailureKind, OptimizationRequest, optimize_portfolio};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::info;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod test_utils {
    use super::*;

    /// Daily `[ms, price]` pairs ending today at midnight UTC.
    pub fn market_chart(days: usize, price: impl Fn(usize) -> f64) -> serde_json::Value {
        let today = chrono::Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis();
        let prices: Vec<serde_json::Value> = (0..days)
            .map(|i| {
                let ts = today - (days - 1 - i) as i64 * 86_400_000;
                json!([ts, price(i)])
            })
            .collect();
        json!({ "prices": prices })
    }

    pub async fn create_coingecko_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/simple/price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "bitcoin": {"usd": 60000.0},
                "ethereum": {"usd": 3000.0}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/bitcoin/market_chart"))
            .respond_with(ResponseTemplate::new(200).set_body_json(market_chart(61, |i| {
                let t = i as f64;
                60000.0 * (1.0 + 0.002 * t) * (1.0 + 0.03 * (t * 0.7).sin())
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/ethereum/market_chart"))
            .respond_with(ResponseTemplate::new(200).set_body_json(market_chart(61, |i| {
                let t = i as f64;
                3000.0 * (1.0 + 0.001 * t) * (1.0 + 0.05 * (t * 1.1).sin())
            })))
            .mount(&server)
            .await;
        server
    }

    pub fn config(base_url: &str, backend: &str, dir: &str) -> AppConfig {
        let yaml = format!(
            r#"
providers:
  coingecko:
    base_url: "{base_url}"
  coinapi:
    api_key: ""
cache:
  backend: {backend}
  dir: "{dir}"
network:
  timeout_secs: 5
  max_attempts: 1
optimizer:
  allow_multi_source: false
"#
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    pub fn holdings(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(s, a)| (s.to_string(), *a)).collect()
    }
}

use test_utils::*;

#[test_log::test(tokio::test)]
async fn test_optimize_btc_eth_against_mock_coingecko() {
    let server = create_coingecko_server().await;
    let dir = tempfile::tempdir().unwrap();
    let config = config(&server.uri(), "memory", dir.path().to_str().unwrap());
    let ctx = DataContext::from_config(&config).unwrap();

    let mut request = OptimizationRequest::new(holdings(&[("BTC", 1.0), ("ETH", 2.0)]));
    request.allow_multi_source = false;
    let result = optimize_portfolio(&ctx, &request).await;
    info!(weights = ?result.weights, note = ?result.note, "Optimization result");

    assert!(result.is_success(), "note: {:?}", result.note);
    assert_eq!(result.total_value, Some(66000.0));

    let weights = result.weights.as_ref().unwrap();
    assert_eq!(weights.len(), 2);
    assert!(weights.values().all(|w| *w > 0.0));
    assert!(weights.values().sum::<f64>() <= 1.0);
    assert!(result.volatility.unwrap() > 0.0);
    assert!(result.sharpe_ratio.unwrap().is_finite());

    let frontier = &result.efficient_frontier;
    assert!(frontier.len() >= 3);
    assert!(frontier.windows(2).all(|p| p[0].volatility <= p[1].volatility));

    let rolling = result.rolling_metrics.as_ref().unwrap();
    // 60 return days, window 30
    assert_eq!(rolling.dates.len(), 31);

    if let Some(alloc) = &result.allocation {
        let spent = alloc.units["BTC"] * 60000.0 + alloc.units["ETH"] * 3000.0;
        assert!(alloc.leftover >= 0.0);
        assert!(spent <= 66000.0 + 1e-6);
    }

    let json = serde_json::to_value(&result).unwrap();
    assert!(json["efficient_frontier"][0]["return"].is_number());
    assert_eq!(json["failure"], serde_json::Value::Null);
}

#[test_log::test(tokio::test)]
async fn test_single_holding_never_reaches_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let config = config(&server.uri(), "memory", dir.path().to_str().unwrap());
    let ctx = DataContext::from_config(&config).unwrap();

    let request = OptimizationRequest::new(holdings(&[("BTC", 1.0), ("ETH", 0.0)]));
    let result = optimize_portfolio(&ctx, &request).await;

    assert_eq!(result.failure, Some(FailureKind::InsufficientInput));
    assert!(result.weights.is_none());
}

#[test_log::test(tokio::test)]
async fn test_file_cache_serves_second_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/coins/bitcoin/market_chart"))
        .respond_with(ResponseTemplate::new(200).set_body_json(market_chart(5, |i| {
            100.0 + i as f64
        })))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let config = config(&server.uri(), "file", dir.path().to_str().unwrap());
    let symbols = vec!["BTC".to_string()];

    for _ in 0..2 {
        let ctx = DataContext::from_config(&config).unwrap();
        let (matrix, missing) = get_historical_prices(&ctx, &symbols, 5, false, &|_: &str| {}).await;
        assert!(missing.is_empty());
        assert_eq!(matrix.n_rows(), 5);
        assert_eq!(matrix.last_price("BTC"), Some(104.0));
    }
    assert!(dir.path().join("bitcoin_5days.json").exists());
}

#[test_log::test(tokio::test)]
async fn test_unreachable_provider_reports_missing_symbols() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/simple/price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bitcoin": {"usd": 60000.0},
            "ethereum": {"usd": 3000.0}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let config = config(&server.uri(), "memory", dir.path().to_str().unwrap());
    let ctx = DataContext::from_config(&config).unwrap();

    let mut request = OptimizationRequest::new(holdings(&[("BTC", 1.0), ("ETH", 2.0)]));
    request.allow_multi_source = false;
    let result = optimize_portfolio(&ctx, &request).await;

    assert_eq!(result.failure, Some(FailureKind::DataUnavailable));
    assert_eq!(result.missing_symbols, vec!["BTC", "ETH"]);
    assert!(result.note.unwrap().contains("BTC, ETH"));
}

//! Expected annual return estimates from daily returns.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

pub const TRADING_DAYS: f64 = 252.0;
pub const MIN_ANNUAL_RETURN: f64 = -0.5;
pub const MAX_ANNUAL_RETURN: f64 = 0.75;

/// Drops every row that has a non-finite cell.
pub fn complete_rows(returns: &DMatrix<f64>) -> DMatrix<f64> {
    let keep: Vec<usize> = (0..returns.nrows())
        .filter(|&t| returns.row(t).iter().all(|v| v.is_finite()))
        .collect();
    returns.select_rows(keep.iter())
}

/// Exponentially weighted mean of daily returns (adjusted weights, `alpha =
/// 2 / (span + 1)`), compounded to a year.
pub fn ema_historical_return(returns: &DMatrix<f64>, span: usize) -> DVector<f64> {
    let alpha = 2.0 / (span.max(1) as f64 + 1.0);
    let n = returns.nrows();
    let weights: Vec<f64> = (0..n)
        .map(|t| (1.0 - alpha).powi((n - 1 - t) as i32))
        .collect();
    let total: f64 = weights.iter().sum();
    DVector::from_fn(returns.ncols(), |j, _| {
        let ema = returns
            .column(j)
            .iter()
            .zip(&weights)
            .map(|(r, w)| r * w)
            .sum::<f64>()
            / total;
        (1.0 + ema).powf(TRADING_DAYS) - 1.0
    })
}

/// Geometric mean of daily returns, annualized.
pub fn mean_historical_return(returns: &DMatrix<f64>) -> DVector<f64> {
    let n = returns.nrows() as f64;
    DVector::from_fn(returns.ncols(), |j, _| {
        let growth: f64 = returns.column(j).iter().map(|r| 1.0 + r).product();
        growth.powf(TRADING_DAYS / n) - 1.0
    })
}

/// CAPM return against an equal-weighted market of the same assets.
/// A market with no variance gives every asset a beta of zero.
pub fn capm_return(returns: &DMatrix<f64>, risk_free_rate: f64) -> DVector<f64> {
    let market = DMatrix::from_column_slice(
        returns.nrows(),
        1,
        returns.column_mean().as_slice(),
    );
    let market_return = mean_historical_return(&market)[0];

    let n = returns.nrows() as f64;
    let m_mean = market.mean();
    let m_var = market.iter().map(|m| (m - m_mean).powi(2)).sum::<f64>() / n;

    DVector::from_fn(returns.ncols(), |j, _| {
        let col = returns.column(j);
        let a_mean = col.mean();
        let cov = col
            .iter()
            .zip(market.iter())
            .map(|(a, m)| (a - a_mean) * (m - m_mean))
            .sum::<f64>()
            / n;
        let beta = if m_var > 0.0 { cov / m_var } else { 0.0 };
        risk_free_rate + beta * (market_return - risk_free_rate)
    })
}

/// `exp(mean daily log return × 252) − 1`
pub fn log_return(log_returns: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_fn(log_returns.ncols(), |j, _| {
        (log_returns.column(j).mean() * TRADING_DAYS).exp() - 1.0
    })
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}

/// Per-asset median of the EMA, mean, CAPM and log estimates, clipped to a
/// plausible annual range.
///
/// `simple` and `log` are daily simple and log returns without missing cells.
pub fn expected_returns(
    simple: &DMatrix<f64>,
    log: &DMatrix<f64>,
    lookback_days: u32,
    risk_free_rate: f64,
) -> DVector<f64> {
    let span = (lookback_days / 3).max(1) as usize;
    let estimates = [
        ema_historical_return(simple, span),
        mean_historical_return(simple),
        capm_return(simple, risk_free_rate),
        log_return(log),
    ];
    debug!(?estimates, "Return estimates");

    DVector::from_fn(simple.ncols(), |j, _| {
        let mut values: Vec<f64> = estimates.iter().map(|e| e[j]).collect();
        median(&mut values).clamp(MIN_ANNUAL_RETURN, MAX_ANNUAL_RETURN)
    })
}

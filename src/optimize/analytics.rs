//! Descriptive statistics reported alongside optimized weights.

use crate::data::PriceMatrix;
use crate::optimize::returns::TRADING_DAYS;
use chrono::NaiveDate;
use nalgebra::DMatrix;
use serde::Serialize;
use std::collections::BTreeMap;

pub const ROLLING_WINDOW: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativeReturns {
    pub dates: Vec<NaiveDate>,
    pub assets: BTreeMap<String, Vec<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RollingSeries {
    pub volatility: Vec<f64>,
    /// `None` where the window has no volatility.
    pub sharpe: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollingMetrics {
    pub window: usize,
    pub dates: Vec<NaiveDate>,
    pub assets: BTreeMap<String, RollingSeries>,
    /// Equal-weight proxy: the row mean of daily log returns.
    pub portfolio: RollingSeries,
}

/// Pearson correlation between the columns of `returns`. Entries involving a
/// column without variance are `None`.
pub fn correlation_matrix(returns: &DMatrix<f64>) -> Vec<Vec<Option<f64>>> {
    let (n, m) = returns.shape();
    let centered: Vec<Vec<f64>> = (0..m)
        .map(|j| {
            let col = returns.column(j);
            let mean = if n > 0 { col.mean() } else { 0.0 };
            col.iter().map(|v| v - mean).collect()
        })
        .collect();
    let norms: Vec<f64> = centered
        .iter()
        .map(|c| c.iter().map(|v| v * v).sum::<f64>().sqrt())
        .collect();

    (0..m)
        .map(|i| {
            (0..m)
                .map(|j| {
                    let denom = norms[i] * norms[j];
                    if n < 2 || denom.is_nan() || denom <= 0.0 {
                        return None;
                    }
                    let dot: f64 = centered[i]
                        .iter()
                        .zip(&centered[j])
                        .map(|(a, b)| a * b)
                        .sum();
                    Some((dot / denom).clamp(-1.0, 1.0))
                })
                .collect()
        })
        .collect()
}

/// Growth of one unit of each asset over the full date axis, starting at 1.0.
pub fn cumulative_returns(matrix: &PriceMatrix) -> CumulativeReturns {
    let simple = matrix.simple_returns();
    let assets = matrix
        .symbols()
        .iter()
        .enumerate()
        .map(|(j, symbol)| {
            let mut acc = 1.0;
            let mut values = Vec::with_capacity(matrix.n_rows());
            if matrix.n_rows() > 0 {
                values.push(acc);
            }
            for r in simple.column(j).iter() {
                if r.is_finite() {
                    acc *= 1.0 + r;
                }
                values.push(acc);
            }
            (symbol.clone(), values)
        })
        .collect();
    CumulativeReturns {
        dates: matrix.dates().to_vec(),
        assets,
    }
}

fn rolling_series(values: &[f64], window: usize, risk_free_rate: f64) -> RollingSeries {
    let mut series = RollingSeries::default();
    if values.len() < window {
        return series;
    }
    for slice in values.windows(window) {
        let n = slice.len() as f64;
        let mean = slice.iter().sum::<f64>() / n;
        let var = slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let volatility = var.sqrt() * TRADING_DAYS.sqrt();
        let sharpe = (volatility > 0.0).then(|| (mean * TRADING_DAYS - risk_free_rate) / volatility);
        series.volatility.push(volatility);
        series.sharpe.push(sharpe);
    }
    series
}

/// Rolling annualized volatility and Sharpe ratio over daily log returns.
/// The first `window - 1` return days have no value and are omitted.
pub fn rolling_metrics(matrix: &PriceMatrix, risk_free_rate: f64, window: usize) -> RollingMetrics {
    let window = window.max(2);
    let log = matrix.log_returns();
    let kept: Vec<usize> = (0..log.nrows())
        .filter(|&t| log.row(t).iter().all(|v| v.is_finite()))
        .collect();

    let dates = if kept.len() >= window {
        kept[window - 1..]
            .iter()
            .map(|&t| matrix.dates()[t + 1])
            .collect()
    } else {
        Vec::new()
    };

    let assets = matrix
        .symbols()
        .iter()
        .enumerate()
        .map(|(j, symbol)| {
            let values: Vec<f64> = kept.iter().map(|&t| log[(t, j)]).collect();
            (symbol.clone(), rolling_series(&values, window, risk_free_rate))
        })
        .collect();

    let proxy: Vec<f64> = kept.iter().map(|&t| log.row(t).mean()).collect();
    RollingMetrics {
        window,
        dates,
        assets,
        portfolio: rolling_series(&proxy, window, risk_free_rate),
    }
}

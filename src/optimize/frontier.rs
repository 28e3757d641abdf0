//! Efficient frontier sampling for display.

use crate::optimize::solver::{Objective, WeightBounds, optimize, performance};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use tracing::{debug, warn};

const POINTS: usize = 15;
const FALLBACK_MIN_VOL: f64 = 0.15;
const FALLBACK_MAX_SHARPE_VOL: f64 = 0.40;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrontierPoint {
    pub volatility: f64,
    #[serde(rename = "return")]
    pub expected_return: f64,
}

/// Illustrative risk/return line used when too few real points could be solved.
pub fn fallback_frontier() -> Vec<FrontierPoint> {
    (0..5)
        .map(|i| {
            let volatility = 0.2 + 0.1 * i as f64;
            FrontierPoint {
                volatility,
                expected_return: 0.05 + 1.2 * volatility,
            }
        })
        .collect()
}

fn linspace(start: f64, end: f64, n: usize) -> impl Iterator<Item = f64> {
    let step = if n > 1 {
        (end - start) / (n - 1) as f64
    } else {
        0.0
    };
    (0..n).map(move |i| start + step * i as f64)
}

/// Samples the long-only, unregularized frontier between the minimum-volatility
/// and max-Sharpe anchors. Never fails; the result is sorted by volatility and
/// has at least three points.
pub fn efficient_frontier(
    mu: &DVector<f64>,
    sigma: &DMatrix<f64>,
    risk_free_rate: f64,
) -> Vec<FrontierPoint> {
    let bounds = WeightBounds::new(0.0, 1.0);
    let anchor = |objective: Objective, fallback: f64| {
        match optimize(mu, sigma, objective, bounds, 0.0, risk_free_rate) {
            Ok(w) => performance(&w, mu, sigma, risk_free_rate).volatility,
            Err(e) => {
                warn!("Could not calculate {:?} anchor: {}", objective, e);
                fallback
            }
        }
    };
    let min_vol = anchor(Objective::MinVolatility, FALLBACK_MIN_VOL);
    let max_sharpe_vol = anchor(Objective::MaxSharpe, FALLBACK_MAX_SHARPE_VOL);

    let low = (min_vol * 0.9).max(0.1);
    let high = (max_sharpe_vol * 1.5).max(0.6);
    debug!(low, high, "Sampling efficient frontier");

    let mut points: Vec<FrontierPoint> = linspace(low, high, POINTS)
        .filter_map(|target| {
            optimize(
                mu,
                sigma,
                Objective::EfficientRisk(target),
                bounds,
                0.0,
                risk_free_rate,
            )
            .ok()
        })
        .map(|w| {
            let p = performance(&w, mu, sigma, risk_free_rate);
            FrontierPoint {
                volatility: p.volatility,
                expected_return: p.expected_return,
            }
        })
        .collect();

    if points.len() < 3 {
        warn!(
            "Only {} frontier points could be solved, using fallback",
            points.len()
        );
        points = fallback_frontier();
    }
    points.sort_by(|a, b| a.volatility.total_cmp(&b.volatility));
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontier_is_sorted_and_populated() {
        let mu = DVector::from_vec(vec![0.6, 0.3, 0.1]);
        let sigma = DMatrix::from_row_slice(
            3,
            3,
            &[0.64, 0.10, 0.02, 0.10, 0.36, 0.01, 0.02, 0.01, 0.09],
        );
        let points = efficient_frontier(&mu, &sigma, 0.02);
        assert!(points.len() >= 3);
        assert!(points.windows(2).all(|p| p[0].volatility <= p[1].volatility));
        // real points, not the illustrative fallback
        assert_ne!(points, fallback_frontier());
        // at most the single riskiest asset
        assert!(points.iter().all(|p| p.volatility <= 0.8 + 1e-6));
    }

    #[test]
    fn test_unsolvable_inputs_use_fallback() {
        let mu = DVector::from_vec(vec![f64::NAN, 0.1]);
        let sigma = DMatrix::identity(2, 2);
        let points = efficient_frontier(&mu, &sigma, 0.0);
        assert_eq!(points, fallback_frontier());
        assert!((points[4].volatility - 0.6).abs() < 1e-12);
        assert!((points[0].expected_return - 0.29).abs() < 1e-12);
    }

    #[test]
    fn test_frontier_point_serializes_return_field() {
        let p = FrontierPoint {
            volatility: 0.5,
            expected_return: 0.25,
        };
        assert_eq!(
            serde_json::to_string(&p).unwrap(),
            r#"{"volatility":0.5,"return":0.25}"#
        );
    }
}

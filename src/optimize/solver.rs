//! Long-only mean-variance solver over the bounded simplex
//! `{w : Σw = 1, lower ≤ w ≤ upper}`.
//!
//! Every objective is reduced to a sequence of box-and-budget constrained
//! quadratic programs `min w'Aw − c'w`, solved by accelerated projected
//! gradient descent. Constrained objectives bisect on the multiplier of the
//! constraint; max-Sharpe searches the one-parameter family of mean-variance
//! optimal portfolios.

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

const MAX_ITER: usize = 5_000;
const STEP_TOL: f64 = 1e-12;
const PROJECTION_ROUNDS: usize = 100;
const MULTIPLIER_ROUNDS: usize = 40;
const MULTIPLIER_DOUBLINGS: usize = 40;
/// Keeps `A` strictly convex when no L2 penalty is requested.
const RIDGE: f64 = 1e-8;
const FEASIBILITY_EPS: f64 = 1e-9;

#[derive(Debug, Error, PartialEq)]
pub enum SolverError {
    #[error("expected returns has {returns} entries but covariance is {rows}x{cols}")]
    DimensionMismatch {
        returns: usize,
        rows: usize,
        cols: usize,
    },
    #[error("no assets to optimize")]
    Empty,
    #[error("inputs contain non-finite values")]
    NonFinite,
    #[error("weight bounds [{lower}, {upper}] are infeasible for {assets} assets")]
    InfeasibleBounds {
        assets: usize,
        lower: f64,
        upper: f64,
    },
    #[error("at least one asset must have expected return above the risk-free rate {risk_free_rate}")]
    NoExcessReturn { risk_free_rate: f64 },
    #[error("target volatility {target:.4} is below the minimum achievable volatility {min_volatility:.4}")]
    TargetVolatilityTooLow { target: f64, min_volatility: f64 },
    #[error("target return {target:.4} exceeds the maximum achievable return {max_return:.4}")]
    TargetReturnUnreachable { target: f64, max_return: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Objective {
    MaxSharpe,
    MinVolatility,
    /// Maximize return with volatility at most the target.
    EfficientRisk(f64),
    /// Minimize volatility with return at least the target.
    EfficientReturn(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightBounds {
    pub lower: f64,
    pub upper: f64,
}

impl WeightBounds {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn is_feasible(&self, n: usize) -> bool {
        let n = n as f64;
        self.lower <= self.upper
            && n * self.lower <= 1.0 + FEASIBILITY_EPS
            && n * self.upper >= 1.0 - FEASIBILITY_EPS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Performance {
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
}

/// Annualized return, volatility and Sharpe ratio of `weights`. Sharpe is 0
/// for a zero-volatility portfolio.
pub fn performance(
    weights: &DVector<f64>,
    mu: &DVector<f64>,
    sigma: &DMatrix<f64>,
    risk_free_rate: f64,
) -> Performance {
    let expected_return = mu.dot(weights);
    let volatility = (weights.dot(&(sigma * weights))).max(0.0).sqrt();
    let sharpe_ratio = if volatility > 0.0 {
        (expected_return - risk_free_rate) / volatility
    } else {
        0.0
    };
    Performance {
        expected_return,
        volatility,
        sharpe_ratio,
    }
}

/// Drops weights below `cutoff` and rounds the rest to 4 decimals. When
/// rounding pushes the total above 1, the weights rounded up the most lose
/// 0.0001 each until it fits. The result is not renormalized.
pub fn clean_weights(symbols: &[String], weights: &DVector<f64>, cutoff: f64) -> BTreeMap<String, f64> {
    let mut kept: Vec<(&String, f64, i64)> = symbols
        .iter()
        .zip(weights.iter())
        .filter(|(_, w)| **w >= cutoff)
        .map(|(s, w)| (s, *w, (w * 10_000.0).round() as i64))
        .collect();
    // summed in map order so the check matches what callers add up
    kept.sort_by(|a, b| a.0.cmp(b.0));
    let total = |kept: &[(&String, f64, i64)]| -> f64 {
        kept.iter().map(|(_, _, units)| *units as f64 / 10_000.0).sum()
    };

    while total(&kept) > 1.0 {
        let over = kept
            .iter_mut()
            .filter(|(_, _, units)| *units > 0)
            .max_by(|a, b| {
                let excess_a = a.2 as f64 / 10_000.0 - a.1;
                let excess_b = b.2 as f64 / 10_000.0 - b.1;
                excess_a.total_cmp(&excess_b)
            });
        match over {
            Some(entry) => entry.2 -= 1,
            None => break,
        }
    }

    kept.into_iter()
        .filter(|(_, _, units)| *units > 0)
        .map(|(s, _, units)| (s.clone(), units as f64 / 10_000.0))
        .collect()
}

/// Euclidean projection of `v` onto the bounded simplex, by bisection on the
/// shift `tau` in `clamp(v - tau, lower, upper)`.
pub fn project(v: &DVector<f64>, bounds: &WeightBounds) -> DVector<f64> {
    let shifted = |tau: f64| v.map(|x| (x - tau).clamp(bounds.lower, bounds.upper));
    let mut lo = v.min() - bounds.upper;
    let mut hi = v.max() - bounds.lower;
    for _ in 0..PROJECTION_ROUNDS {
        let mid = 0.5 * (lo + hi);
        if shifted(mid).sum() > 1.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    shifted(0.5 * (lo + hi))
}

fn gershgorin_bound(a: &DMatrix<f64>) -> f64 {
    a.row_iter()
        .map(|r| r.iter().map(|x| x.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// Minimizes `w'Aw − c'w` over the bounded simplex (FISTA with adaptive restart).
fn minimize_quadratic(
    a: &DMatrix<f64>,
    c: &DVector<f64>,
    bounds: &WeightBounds,
    start: &DVector<f64>,
) -> DVector<f64> {
    let lipschitz = (2.0 * gershgorin_bound(a)).max(1e-12);
    let step = 1.0 / lipschitz;

    let mut x = project(start, bounds);
    let mut y = x.clone();
    let mut t = 1.0_f64;
    for _ in 0..MAX_ITER {
        let grad = 2.0 * (a * &y) - c;
        let x_next = project(&(&y - step * grad), bounds);
        let delta = &x_next - &x;
        let moved = delta.amax();

        let t_next = 0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt());
        if (&y - &x_next).dot(&delta) > 0.0 {
            t = 1.0;
            y = x_next.clone();
        } else {
            y = &x_next + ((t - 1.0) / t_next) * &delta;
            t = t_next;
        }
        x = x_next;
        if moved < STEP_TOL {
            break;
        }
    }
    x
}

struct Problem<'a> {
    mu: &'a DVector<f64>,
    sigma: &'a DMatrix<f64>,
    bounds: WeightBounds,
    gamma: f64,
    start: DVector<f64>,
}

impl Problem<'_> {
    fn n(&self) -> usize {
        self.mu.len()
    }

    fn penalty(&self) -> DMatrix<f64> {
        DMatrix::identity(self.n(), self.n()) * self.gamma.max(RIDGE)
    }

    fn volatility(&self, w: &DVector<f64>) -> f64 {
        w.dot(&(self.sigma * w)).max(0.0).sqrt()
    }

    /// `argmin risk_weight·w'Σw + γ‖w‖² − return_weight·μ'w`
    fn trade_off(&self, risk_weight: f64, return_weight: f64, start: &DVector<f64>) -> DVector<f64> {
        let a = self.sigma * risk_weight + self.penalty();
        let c = self.mu * return_weight;
        minimize_quadratic(&a, &c, &self.bounds, start)
    }

    /// Minimum-variance portfolio ignoring the L2 penalty.
    fn pure_min_variance(&self) -> DVector<f64> {
        let a = self.sigma + DMatrix::identity(self.n(), self.n()) * RIDGE;
        minimize_quadratic(&a, &DVector::zeros(self.n()), &self.bounds, &self.start)
    }

    /// Largest `μ'w` over the feasible set: floors everywhere, then fill the
    /// best assets up to their cap.
    fn max_return_portfolio(&self) -> DVector<f64> {
        let mut w = DVector::from_element(self.n(), self.bounds.lower);
        let mut remaining = 1.0 - self.bounds.lower * self.n() as f64;
        let mut order: Vec<usize> = (0..self.n()).collect();
        order.sort_by(|&i, &j| self.mu[j].total_cmp(&self.mu[i]));
        for i in order {
            let add = (self.bounds.upper - self.bounds.lower).min(remaining).max(0.0);
            w[i] += add;
            remaining -= add;
        }
        w
    }

    fn min_volatility(&self) -> DVector<f64> {
        self.trade_off(1.0, 0.0, &self.start)
    }

    fn efficient_risk(&self, target: f64) -> Result<DVector<f64>, SolverError> {
        let floor = self.pure_min_variance();
        let min_volatility = self.volatility(&floor);
        if min_volatility > target + FEASIBILITY_EPS {
            return Err(SolverError::TargetVolatilityTooLow {
                target,
                min_volatility,
            });
        }

        let unconstrained = self.trade_off(0.0, 1.0, &self.start);
        if self.volatility(&unconstrained) <= target {
            return Ok(unconstrained);
        }

        // Larger risk weights give lower volatility.
        let mut lo = 0.0;
        let mut hi = 1.0;
        let mut best = None;
        for _ in 0..MULTIPLIER_DOUBLINGS {
            let w = self.trade_off(hi, 1.0, &self.start);
            if self.volatility(&w) <= target {
                best = Some(w);
                break;
            }
            lo = hi;
            hi *= 2.0;
        }
        let Some(mut best) = best else {
            return Ok(floor);
        };

        for _ in 0..MULTIPLIER_ROUNDS {
            let mid = 0.5 * (lo + hi);
            let w = self.trade_off(mid, 1.0, &best);
            if self.volatility(&w) <= target {
                hi = mid;
                best = w;
            } else {
                lo = mid;
            }
        }
        Ok(best)
    }

    fn efficient_return(&self, target: f64) -> Result<DVector<f64>, SolverError> {
        let ceiling = self.max_return_portfolio();
        let max_return = self.mu.dot(&ceiling);
        if target > max_return + FEASIBILITY_EPS {
            return Err(SolverError::TargetReturnUnreachable { target, max_return });
        }

        let base = self.min_volatility();
        if self.mu.dot(&base) >= target {
            return Ok(base);
        }

        // Larger return weights give higher return.
        let mut lo = 0.0;
        let mut hi = 1.0;
        let mut best = None;
        for _ in 0..MULTIPLIER_DOUBLINGS {
            let w = self.trade_off(1.0, hi, &self.start);
            if self.mu.dot(&w) >= target {
                best = Some(w);
                break;
            }
            lo = hi;
            hi *= 2.0;
        }
        let Some(mut best) = best else {
            return Ok(ceiling);
        };

        for _ in 0..MULTIPLIER_ROUNDS {
            let mid = 0.5 * (lo + hi);
            let w = self.trade_off(1.0, mid, &best);
            if self.mu.dot(&w) >= target {
                hi = mid;
                best = w;
            } else {
                lo = mid;
            }
        }
        Ok(best)
    }

    fn max_sharpe(&self, risk_free_rate: f64) -> Result<DVector<f64>, SolverError> {
        if self.mu.iter().all(|m| *m <= risk_free_rate) {
            return Err(SolverError::NoExcessReturn { risk_free_rate });
        }

        let score = |w: &DVector<f64>| {
            let p = performance(w, self.mu, self.sigma, risk_free_rate);
            p.sharpe_ratio - self.gamma * w.norm_squared()
        };

        // Scan log(risk weight), then refine around the best sample.
        let grid: Vec<f64> = (0..=28).map(|k| -3.0 + 0.25 * k as f64).collect();
        let mut samples = Vec::with_capacity(grid.len());
        let mut warm = self.start.clone();
        for &log_l in &grid {
            let w = self.trade_off(10f64.powf(log_l), 1.0, &warm);
            warm = w.clone();
            samples.push((score(&w), w));
        }
        let min_vol = self.min_volatility();
        let mut best = (score(&min_vol), min_vol);

        let (k, _) = samples
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.0.total_cmp(&b.1.0))
            .unwrap_or((0, &samples[0]));
        if samples[k].0 > best.0 {
            best = samples[k].clone();
        }

        let golden = 0.5 * (5f64.sqrt() - 1.0);
        let mut a = grid[k.saturating_sub(1)];
        let mut b = grid[(k + 1).min(grid.len() - 1)];
        let eval = |log_l: f64, start: &DVector<f64>| {
            let w = self.trade_off(10f64.powf(log_l), 1.0, start);
            (score(&w), w)
        };
        let mut x1 = b - golden * (b - a);
        let mut x2 = a + golden * (b - a);
        let mut f1 = eval(x1, &best.1);
        let mut f2 = eval(x2, &best.1);
        for _ in 0..MULTIPLIER_ROUNDS {
            if f1.0 >= f2.0 {
                b = x2;
                x2 = x1;
                f2 = f1;
                x1 = b - golden * (b - a);
                f1 = eval(x1, &f2.1);
            } else {
                a = x1;
                x1 = x2;
                f1 = f2;
                x2 = a + golden * (b - a);
                f2 = eval(x2, &f1.1);
            }
        }
        for candidate in [f1, f2] {
            if candidate.0 > best.0 {
                best = candidate;
            }
        }
        Ok(best.1)
    }
}

/// Optimal weights for `objective` under `bounds` with an L2 penalty of `gamma`.
pub fn optimize(
    mu: &DVector<f64>,
    sigma: &DMatrix<f64>,
    objective: Objective,
    bounds: WeightBounds,
    gamma: f64,
    risk_free_rate: f64,
) -> Result<DVector<f64>, SolverError> {
    let n = mu.len();
    if sigma.nrows() != n || sigma.ncols() != n {
        return Err(SolverError::DimensionMismatch {
            returns: n,
            rows: sigma.nrows(),
            cols: sigma.ncols(),
        });
    }
    if n == 0 {
        return Err(SolverError::Empty);
    }
    if mu.iter().chain(sigma.iter()).any(|x| !x.is_finite())
        || !gamma.is_finite()
        || !risk_free_rate.is_finite()
    {
        return Err(SolverError::NonFinite);
    }
    if !bounds.is_feasible(n) {
        return Err(SolverError::InfeasibleBounds {
            assets: n,
            lower: bounds.lower,
            upper: bounds.upper,
        });
    }

    let problem = Problem {
        mu,
        sigma,
        bounds,
        gamma,
        start: project(&DVector::from_element(n, 1.0 / n as f64), &bounds),
    };
    debug!(?objective, assets = n, gamma, "Solving portfolio");
    match objective {
        Objective::MaxSharpe => problem.max_sharpe(risk_free_rate),
        Objective::MinVolatility => Ok(problem.min_volatility()),
        Objective::EfficientRisk(target) => problem.efficient_risk(target),
        Objective::EfficientReturn(target) => problem.efficient_return(target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag(values: &[f64]) -> DMatrix<f64> {
        DMatrix::from_diagonal(&DVector::from_column_slice(values))
    }

    fn assert_feasible(w: &DVector<f64>, bounds: &WeightBounds) {
        assert!((w.sum() - 1.0).abs() < 1e-9, "sum = {}", w.sum());
        for x in w.iter() {
            assert!(*x >= bounds.lower - 1e-9 && *x <= bounds.upper + 1e-9, "w = {w}");
        }
    }

    #[test]
    fn test_projection_lands_in_feasible_set() {
        let bounds = WeightBounds::new(0.05, 0.6);
        let v = DVector::from_vec(vec![3.0, -1.0, 0.2, 0.1]);
        let w = project(&v, &bounds);
        assert_feasible(&w, &bounds);
        assert!((w[0] - 0.6).abs() < 1e-9);
        assert!((w[1] - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_min_volatility_matches_closed_form() {
        let mu = DVector::from_vec(vec![0.1, 0.1]);
        let sigma = diag(&[0.04, 0.16]);
        let bounds = WeightBounds::new(0.0, 1.0);
        let w = optimize(&mu, &sigma, Objective::MinVolatility, bounds, 0.0, 0.0).unwrap();
        assert_feasible(&w, &bounds);
        // inverse-variance weights
        assert!((w[0] - 0.8).abs() < 1e-4, "w = {w}");
    }

    #[test]
    fn test_max_sharpe_finds_tangency() {
        let mu = DVector::from_vec(vec![0.2, 0.1]);
        let sigma = diag(&[0.04, 0.04]);
        let bounds = WeightBounds::new(0.0, 1.0);
        let w = optimize(&mu, &sigma, Objective::MaxSharpe, bounds, 0.0, 0.0).unwrap();
        assert!((w[0] - 2.0 / 3.0).abs() < 1e-3, "w = {w}");
    }

    #[test]
    fn test_max_sharpe_with_penalty_stays_feasible() {
        let mu = DVector::from_vec(vec![0.6, 0.3, 0.2]);
        let sigma = diag(&[0.5, 0.4, 0.3]);
        let bounds = WeightBounds::new(0.0, 0.6);
        let plain = optimize(&mu, &sigma, Objective::MaxSharpe, bounds, 0.0, 0.02).unwrap();
        let spread = optimize(&mu, &sigma, Objective::MaxSharpe, bounds, 0.3, 0.02).unwrap();
        assert_feasible(&plain, &bounds);
        assert_feasible(&spread, &bounds);

        let best = performance(&plain, &mu, &sigma, 0.02).sharpe_ratio;
        let penalized = performance(&spread, &mu, &sigma, 0.02).sharpe_ratio;
        assert!(penalized <= best + 1e-6);
        assert!(penalized > 0.0);
    }

    #[test]
    fn test_max_sharpe_without_excess_return_fails() {
        let mu = DVector::from_vec(vec![0.01, 0.015]);
        let sigma = diag(&[0.04, 0.04]);
        let res = optimize(
            &mu,
            &sigma,
            Objective::MaxSharpe,
            WeightBounds::new(0.0, 1.0),
            0.3,
            0.02,
        );
        assert_eq!(res, Err(SolverError::NoExcessReturn { risk_free_rate: 0.02 }));
    }

    #[test]
    fn test_efficient_risk() {
        let mu = DVector::from_vec(vec![0.5, 0.1]);
        let sigma = diag(&[0.36, 0.04]);
        let bounds = WeightBounds::new(0.0, 1.0);

        let w = optimize(&mu, &sigma, Objective::EfficientRisk(0.3), bounds, 0.0, 0.0).unwrap();
        let p = performance(&w, &mu, &sigma, 0.0);
        assert!(p.volatility <= 0.3 + 1e-6);
        assert!(p.volatility > 0.29, "constraint should bind: {p:?}");

        let too_low = optimize(&mu, &sigma, Objective::EfficientRisk(0.05), bounds, 0.0, 0.0);
        assert!(matches!(
            too_low,
            Err(SolverError::TargetVolatilityTooLow { .. })
        ));

        // loose target: the max-return corner
        let w = optimize(&mu, &sigma, Objective::EfficientRisk(0.9), bounds, 0.0, 0.0).unwrap();
        assert!((w[0] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_efficient_return() {
        let mu = DVector::from_vec(vec![0.5, 0.1]);
        let sigma = diag(&[0.36, 0.04]);
        let bounds = WeightBounds::new(0.0, 1.0);

        let w = optimize(&mu, &sigma, Objective::EfficientReturn(0.3), bounds, 0.3, 0.0).unwrap();
        let p = performance(&w, &mu, &sigma, 0.0);
        assert!(p.expected_return >= 0.3 - 1e-9, "{p:?}");
        assert!(p.expected_return < 0.31, "{p:?}");

        let res = optimize(&mu, &sigma, Objective::EfficientReturn(0.6), bounds, 0.3, 0.0);
        assert!(matches!(
            res,
            Err(SolverError::TargetReturnUnreachable { .. })
        ));
    }

    #[test]
    fn test_input_errors() {
        let mu = DVector::from_vec(vec![0.1, 0.2, 0.3]);
        let sigma = diag(&[0.1, 0.1, 0.1]);
        let infeasible = optimize(
            &mu,
            &sigma,
            Objective::MinVolatility,
            WeightBounds::new(0.0, 0.3),
            0.3,
            0.0,
        );
        assert!(matches!(infeasible, Err(SolverError::InfeasibleBounds { .. })));

        let mismatch = optimize(
            &mu,
            &diag(&[0.1, 0.1]),
            Objective::MinVolatility,
            WeightBounds::new(0.0, 1.0),
            0.3,
            0.0,
        );
        assert!(matches!(mismatch, Err(SolverError::DimensionMismatch { .. })));

        let nan = DVector::from_vec(vec![0.1, f64::NAN, 0.3]);
        let res = optimize(
            &nan,
            &sigma,
            Objective::MinVolatility,
            WeightBounds::new(0.0, 1.0),
            0.3,
            0.0,
        );
        assert_eq!(res, Err(SolverError::NonFinite));
    }

    #[test]
    fn test_clean_weights_drops_and_rounds() {
        let symbols = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let w = DVector::from_vec(vec![0.612345, 0.36, 0.027655]);
        let cleaned = clean_weights(&symbols, &w, 0.05);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned["A"], 0.6123);
        assert_eq!(cleaned["B"], 0.36);
        assert!(cleaned.values().sum::<f64>() <= 1.0);
    }

    #[test]
    fn test_clean_weights_rounding_never_exceeds_one() {
        let symbols = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let w = DVector::from_vec(vec![0.33336, 0.33336, 0.33328]);
        let cleaned = clean_weights(&symbols, &w, 0.05);
        assert_eq!(cleaned.len(), 3);
        assert!(cleaned.values().sum::<f64>() <= 1.0);
        assert!(cleaned.values().all(|v| *v >= 0.3332 && *v <= 0.3334));
    }
}

//! Covariance estimation.

use crate::optimize::returns::TRADING_DAYS;
use nalgebra::DMatrix;
use tracing::debug;

/// Ledoit–Wolf shrinkage of the sample covariance toward a scaled identity.
///
/// Returns the annualized covariance and the shrinkage intensity in `[0, 1]`.
/// `returns` holds daily returns, one row per day, without missing cells.
pub fn ledoit_wolf(returns: &DMatrix<f64>) -> (DMatrix<f64>, f64) {
    let (n, p) = returns.shape();
    if n == 0 || p == 0 {
        return (DMatrix::zeros(p, p), 0.0);
    }
    let nf = n as f64;
    let pf = p as f64;

    let means = returns.row_mean();
    let mut x = returns.clone();
    for mut row in x.row_iter_mut() {
        row -= &means;
    }

    let emp_cov = x.transpose() * &x / nf;
    let mu = emp_cov.trace() / pf;

    let shrinkage = if p == 1 {
        0.0
    } else {
        let x2 = x.map(|v| v * v);
        let emp_cov_trace_sum = x2.sum() / nf;
        let beta_ = (x2.transpose() * &x2).sum();
        let delta_ = (x.transpose() * &x).map(|v| v * v).sum() / (nf * nf);
        let beta = (beta_ / nf - delta_) / (pf * nf);
        let delta = (delta_ - 2.0 * mu * emp_cov_trace_sum + pf * mu * mu) / pf;
        let beta = beta.min(delta);
        if beta == 0.0 || delta == 0.0 {
            0.0
        } else {
            beta / delta
        }
    };
    debug!(shrinkage, assets = p, days = n, "Ledoit-Wolf covariance");

    let mut shrunk = emp_cov * (1.0 - shrinkage);
    for i in 0..p {
        shrunk[(i, i)] += shrinkage * mu;
    }
    (shrunk * TRADING_DAYS, shrinkage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;

    fn sample_returns() -> DMatrix<f64> {
        DMatrix::from_fn(40, 3, |t, j| {
            let t = t as f64;
            match j {
                0 => 0.02 * (t * 0.7).sin(),
                1 => 0.015 * (t * 0.7).sin() + 0.005 * (t * 1.3).cos(),
                _ => 0.03 * (t * 0.4).cos(),
            }
        })
    }

    #[test]
    fn test_symmetric_psd_and_bounded_shrinkage() {
        let (cov, shrinkage) = ledoit_wolf(&sample_returns());
        assert!((0.0..=1.0).contains(&shrinkage));
        assert_eq!(cov.shape(), (3, 3));
        assert!((&cov - cov.transpose()).amax() < 1e-12);
        let eigen = cov.clone().symmetric_eigen();
        assert!(eigen.eigenvalues.iter().all(|e| *e > -1e-12));
    }

    #[test]
    fn test_matches_shrinkage_formula_on_two_assets() {
        let r = DMatrix::from_row_slice(4, 2, &[0.01, 0.02, -0.01, 0.0, 0.02, 0.01, 0.0, -0.03]);
        let (cov, s) = ledoit_wolf(&r);
        let centered = {
            let means = r.row_mean();
            let mut x = r.clone();
            for mut row in x.row_iter_mut() {
                row -= &means;
            }
            x
        };
        let emp = centered.transpose() * &centered / 4.0;
        let mu = emp.trace() / 2.0;
        let expected_01 = (1.0 - s) * emp[(0, 1)] * TRADING_DAYS;
        let expected_00 = ((1.0 - s) * emp[(0, 0)] + s * mu) * TRADING_DAYS;
        assert!((cov[(0, 1)] - expected_01).abs() < 1e-12);
        assert!((cov[(0, 0)] - expected_00).abs() < 1e-12);
        assert!(s > 0.0);
    }

    #[test]
    fn test_single_asset_is_annualized_variance() {
        let r = DMatrix::from_column_slice(4, 1, &[0.01, -0.01, 0.02, 0.0]);
        let (cov, s) = ledoit_wolf(&r);
        let mean = 0.005;
        let var = DVector::from_column_slice(&[0.01, -0.01, 0.02, 0.0])
            .map(|v: f64| (v - mean).powi(2))
            .sum()
            / 4.0;
        assert_eq!(s, 0.0);
        assert!((cov[(0, 0)] - var * TRADING_DAYS).abs() < 1e-12);
    }

    #[test]
    fn test_no_rows_gives_zero_matrix() {
        let (cov, s) = ledoit_wolf(&DMatrix::zeros(0, 2));
        assert_eq!(cov, DMatrix::zeros(2, 2));
        assert_eq!(s, 0.0);
    }
}

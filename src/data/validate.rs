//! Quality checks on historical price matrices.

use crate::data::matrix::PriceMatrix;
use nalgebra::DMatrix;
use serde::Serialize;
use std::fmt::Display;
use tracing::{debug, warn};

const MIN_POINTS_FLOOR: f64 = 20.0;
const MIN_POINTS_SHARE: f64 = 0.8;
const MISSING_WARN: f64 = 0.05;
const MISSING_FAIL: f64 = 0.20;
const EXTREME_MOVE: f64 = 0.30;
const STALE_MOVE: f64 = 0.0001;
const STALE_WARN_SHARE: f64 = 0.1;
const STALE_FAIL_SHARE: f64 = 0.3;
const OUTLIER_Z: f64 = 3.0;
const OUTLIER_WARN_SHARE: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityIssue {
    InsufficientData { available: usize, required: usize },
    MissingValues { percent: f64 },
    ExtremeMoves { days: usize },
    StalePrices { days: usize },
    StatisticalOutliers { days: usize },
}

impl Display for QualityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityIssue::InsufficientData {
                available,
                required,
            } => write!(
                f,
                "Insufficient data points: {available} available, {required} required"
            ),
            QualityIssue::MissingValues { percent } => {
                write!(f, "High percentage of missing values: {percent:.1}%")
            }
            QualityIssue::ExtremeMoves { days } => write!(
                f,
                "Found {days} days with extreme price movements (>30% daily change)"
            ),
            QualityIssue::StalePrices { days } => write!(
                f,
                "Found {days} days with potentially stale prices (no movement)"
            ),
            QualityIssue::StatisticalOutliers { days } => {
                write!(f, "Found {days} statistical outliers in daily returns")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub issues: Vec<QualityIssue>,
    /// Forward- then back-filled copy of the input.
    pub cleaned: PriceMatrix,
    /// Too few rows to optimize on; the only fatal outcome.
    pub insufficient: bool,
}

/// Smallest row count accepted for a lookback window.
pub fn required_points(lookback_days: u32) -> usize {
    (f64::from(lookback_days) * MIN_POINTS_SHARE)
        .max(MIN_POINTS_FLOOR)
        .ceil() as usize
}

/// Rows of daily returns without any NaN cell.
fn complete_rows(returns: &DMatrix<f64>) -> Vec<Vec<f64>> {
    returns
        .row_iter()
        .map(|r| r.iter().copied().collect::<Vec<_>>())
        .filter(|r| r.iter().all(|v| v.is_finite()))
        .collect()
}

fn outlier_days(rows: &[Vec<f64>]) -> usize {
    let Some(width) = rows.first().map(Vec::len) else {
        return 0;
    };
    let n = rows.len() as f64;
    let stats: Vec<(f64, f64)> = (0..width)
        .map(|j| {
            let mean = rows.iter().map(|r| r[j]).sum::<f64>() / n;
            let var = rows.iter().map(|r| (r[j] - mean).powi(2)).sum::<f64>() / n;
            (mean, var.sqrt())
        })
        .collect();
    rows.iter()
        .filter(|r| {
            r.iter()
                .zip(&stats)
                .any(|(v, (mean, std))| *std > 0.0 && ((v - mean) / std).abs() > OUTLIER_Z)
        })
        .count()
}

/// Checks a price matrix for coverage and plausibility. Cleaning is always
/// applied; only a short matrix is reported as `insufficient`.
pub fn validate_price_matrix(matrix: &PriceMatrix, lookback_days: u32) -> ValidationReport {
    let mut issues = Vec::new();
    let mut is_valid = true;
    let cleaned = matrix.clone().filled();
    let lookback = f64::from(lookback_days);

    let required = required_points(lookback_days);
    if matrix.n_rows() < required {
        let issue = QualityIssue::InsufficientData {
            available: matrix.n_rows(),
            required,
        };
        warn!("{}", issue);
        return ValidationReport {
            is_valid: false,
            issues: vec![issue],
            cleaned,
            insufficient: true,
        };
    }

    let missing = matrix.missing_ratio();
    if missing > MISSING_WARN {
        issues.push(QualityIssue::MissingValues {
            percent: missing * 100.0,
        });
        if missing > MISSING_FAIL {
            is_valid = false;
        }
    }

    let rows = complete_rows(&cleaned.simple_returns());

    let extreme = rows
        .iter()
        .filter(|r| r.iter().any(|v| v.abs() > EXTREME_MOVE))
        .count();
    if extreme > 0 {
        issues.push(QualityIssue::ExtremeMoves { days: extreme });
    }

    let stale = rows
        .iter()
        .filter(|r| r.iter().all(|v| v.abs() < STALE_MOVE))
        .count();
    if stale as f64 > lookback * STALE_WARN_SHARE {
        issues.push(QualityIssue::StalePrices { days: stale });
        if stale as f64 > lookback * STALE_FAIL_SHARE {
            is_valid = false;
        }
    }

    let outliers = outlier_days(&rows);
    if outliers as f64 > lookback * OUTLIER_WARN_SHARE {
        issues.push(QualityIssue::StatisticalOutliers { days: outliers });
    }

    for issue in &issues {
        warn!("Data quality: {}", issue);
    }
    debug!(is_valid, issues = issues.len(), "Validated price matrix");

    ValidationReport {
        is_valid,
        issues,
        cleaned,
        insufficient: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn matrix(columns: Vec<Vec<Option<f64>>>) -> PriceMatrix {
        let n = columns[0].len();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates = start.iter_days().take(n).collect();
        let symbols = (0..columns.len()).map(|j| format!("C{j}")).collect();
        let rows = (0..n)
            .map(|t| columns.iter().map(|c| c[t]).collect())
            .collect();
        PriceMatrix::new(dates, symbols, rows)
    }

    /// Gently oscillating prices: no extreme, stale or outlier days.
    fn smooth(n: usize, base: f64) -> Vec<Option<f64>> {
        (0..n)
            .map(|t| Some(base * (1.0 + 0.01 * ((t % 4) as f64 - 1.5))))
            .collect()
    }

    #[test]
    fn test_required_points() {
        assert_eq!(required_points(60), 48);
        assert_eq!(required_points(10), 20);
        assert_eq!(required_points(30), 24);
    }

    #[test]
    fn test_short_matrix_is_insufficient() {
        let report = validate_price_matrix(&matrix(vec![smooth(30, 10.0)]), 60);
        assert!(report.insufficient);
        assert!(!report.is_valid);
        assert_eq!(
            report.issues,
            vec![QualityIssue::InsufficientData {
                available: 30,
                required: 48
            }]
        );
    }

    #[test]
    fn test_clean_data_has_no_issues() {
        let report = validate_price_matrix(&matrix(vec![smooth(60, 10.0), smooth(60, 50.0)]), 60);
        assert!(report.is_valid);
        assert!(!report.insufficient);
        assert!(report.issues.is_empty(), "{:?}", report.issues);
    }

    #[test]
    fn test_missing_values_over_twenty_percent_invalidate() {
        let mut col = smooth(60, 10.0);
        for cell in col.iter_mut().take(30) {
            *cell = None;
        }
        let report = validate_price_matrix(&matrix(vec![col, smooth(60, 20.0)]), 60);
        assert!(!report.is_valid);
        assert!(matches!(
            report.issues[0],
            QualityIssue::MissingValues { percent } if (percent - 25.0).abs() < 1e-9
        ));
        assert_eq!(report.cleaned.missing_ratio(), 0.0);
    }

    #[test]
    fn test_extreme_move_is_flagged_but_valid() {
        let mut col = smooth(60, 10.0);
        col[30] = Some(20.0);
        let report = validate_price_matrix(&matrix(vec![col]), 60);
        assert!(report.is_valid);
        // up into the spike and back down
        assert!(report.issues.contains(&QualityIssue::ExtremeMoves { days: 2 }));
    }

    #[test]
    fn test_flat_prices_are_stale_and_invalid() {
        let flat = vec![Some(1.0); 60];
        let report = validate_price_matrix(&matrix(vec![flat.clone(), flat]), 60);
        assert!(!report.is_valid);
        assert!(report.issues.contains(&QualityIssue::StalePrices { days: 59 }));
    }

    #[test]
    fn test_spikes_on_different_days_are_outliers_but_valid() {
        // each asset jumps 20% for a single day, twice, never on the same day
        let columns = (0..4)
            .map(|j| {
                let base = 10.0 * (j + 1) as f64;
                (0..61)
                    .map(|t| {
                        let spike = if t == 10 + 3 * j || t == 40 + 3 * j { 1.2 } else { 1.0 };
                        Some(base * (1.0 + 0.001 * (t % 2) as f64) * spike)
                    })
                    .collect()
            })
            .collect();
        let report = validate_price_matrix(&matrix(columns), 60);

        // into and out of each of the 8 spikes
        assert_eq!(report.issues, vec![QualityIssue::StatisticalOutliers { days: 16 }]);
        assert!(report.is_valid);
        assert!(!report.insufficient);
    }

    #[test]
    fn test_issue_messages() {
        assert_eq!(
            QualityIssue::MissingValues { percent: 12.345 }.to_string(),
            "High percentage of missing values: 12.3%"
        );
        assert_eq!(
            QualityIssue::StalePrices { days: 9 }.to_string(),
            "Found 9 days with potentially stale prices (no movement)"
        );
    }
}

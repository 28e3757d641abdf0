//! Price series aligned on a common daily date axis.

use crate::core::price::PriceSeries;
use chrono::NaiveDate;
use nalgebra::DMatrix;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PriceMatrix {
    dates: Vec<NaiveDate>,
    symbols: Vec<String>,
    /// `rows[t][j]` is the price of `symbols[j]` on `dates[t]`.
    rows: Vec<Vec<Option<f64>>>,
}

impl PriceMatrix {
    pub fn new(dates: Vec<NaiveDate>, symbols: Vec<String>, rows: Vec<Vec<Option<f64>>>) -> Self {
        debug_assert_eq!(dates.len(), rows.len());
        debug_assert!(rows.iter().all(|r| r.len() == symbols.len()));
        Self {
            dates,
            symbols,
            rows,
        }
    }

    /// Outer-joins the series on calendar days (UTC), one row per day from the
    /// first to the last observed day. A day's value is its last observation;
    /// days without one are left empty. Series with no usable points are dropped.
    pub fn from_series(series: &[(String, PriceSeries)]) -> Self {
        let mut daily: Vec<(String, BTreeMap<NaiveDate, f64>)> = Vec::new();
        for (symbol, points) in series {
            if daily.iter().any(|(s, _)| s == symbol) {
                continue;
            }
            let mut by_day = BTreeMap::new();
            let mut sorted: Vec<_> = points.iter().filter(|p| p.is_usable()).collect();
            sorted.sort_by_key(|p| p.timestamp_ms);
            for point in sorted {
                if let Some(day) = point.date() {
                    by_day.insert(day, point.price);
                }
            }
            if !by_day.is_empty() {
                daily.push((symbol.clone(), by_day));
            }
        }

        let first = daily.iter().filter_map(|(_, m)| m.keys().next()).min();
        let last = daily.iter().filter_map(|(_, m)| m.keys().next_back()).max();
        let (Some(&first), Some(&last)) = (first, last) else {
            return Self::default();
        };

        let dates: Vec<NaiveDate> = first.iter_days().take_while(|d| *d <= last).collect();
        let rows = dates
            .iter()
            .map(|d| daily.iter().map(|(_, m)| m.get(d).copied()).collect())
            .collect();
        let symbols = daily.into_iter().map(|(s, _)| s).collect();
        Self::new(dates, symbols, rows)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    #[cfg(test)]
    pub fn rows(&self) -> &[Vec<Option<f64>>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0 || self.n_cols() == 0
    }

    pub fn column(&self, j: usize) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r[j]).collect()
    }

    pub fn last_price(&self, symbol: &str) -> Option<f64> {
        let j = self.symbols.iter().position(|s| s == symbol)?;
        self.rows.iter().rev().find_map(|r| r[j])
    }

    /// Share of empty cells over the whole matrix.
    pub fn missing_ratio(&self) -> f64 {
        let total = self.n_rows() * self.n_cols();
        if total == 0 {
            return 0.0;
        }
        let missing = self.rows.iter().flatten().filter(|c| c.is_none()).count();
        missing as f64 / total as f64
    }

    /// Carries the last seen value forward into empty cells.
    pub fn forward_fill(&mut self) {
        for j in 0..self.n_cols() {
            let mut last = None;
            for row in self.rows.iter_mut() {
                match row[j] {
                    Some(v) => last = Some(v),
                    None => row[j] = last,
                }
            }
        }
    }

    /// Carries the next seen value backward into empty cells.
    pub fn back_fill(&mut self) {
        for j in 0..self.n_cols() {
            let mut next = None;
            for row in self.rows.iter_mut().rev() {
                match row[j] {
                    Some(v) => next = Some(v),
                    None => row[j] = next,
                }
            }
        }
    }

    /// Forward fill then back fill.
    pub fn filled(mut self) -> Self {
        self.forward_fill();
        self.back_fill();
        self
    }

    /// Keeps only the named columns, in the given order. Unknown names are skipped.
    #[cfg(test)]
    pub fn select(&self, symbols: &[String]) -> Self {
        let idx: Vec<usize> = symbols
            .iter()
            .filter_map(|s| self.symbols.iter().position(|x| x == s))
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|r| idx.iter().map(|&j| r[j]).collect())
            .collect();
        Self::new(
            self.dates.clone(),
            idx.iter().map(|&j| self.symbols[j].clone()).collect(),
            rows,
        )
    }

    fn returns_with(&self, f: impl Fn(f64, f64) -> f64) -> DMatrix<f64> {
        let n = self.n_rows().saturating_sub(1);
        DMatrix::from_fn(n, self.n_cols(), |t, j| {
            match (self.rows[t][j], self.rows[t + 1][j]) {
                (Some(prev), Some(cur)) if prev != 0.0 => f(prev, cur),
                _ => f64::NAN,
            }
        })
    }

    /// Daily simple returns, one row per date after the first. Empty cells give NaN.
    pub fn simple_returns(&self) -> DMatrix<f64> {
        self.returns_with(|prev, cur| cur / prev - 1.0)
    }

    /// Daily log returns, one row per date after the first. Empty cells give NaN.
    pub fn log_returns(&self) -> DMatrix<f64> {
        self.returns_with(|prev, cur| (cur / prev).ln())
    }
}

//! Portfolio optimization over the data layer.

pub mod allocation;
pub mod analytics;
pub mod frontier;
pub mod returns;
pub mod risk;
pub mod solver;

use crate::core::coins::resolve;
use crate::core::{DataContext, Preferences, RiskMethod};
use crate::data::{
    QualityIssue, get_historical_prices, get_live_prices, validate_price_matrix,
};
use allocation::{DiscreteAllocation, greedy_allocation};
use analytics::{CumulativeReturns, ROLLING_WINDOW, RollingMetrics};
use frontier::FrontierPoint;
use nalgebra::DVector;
use serde::Serialize;
use solver::{Objective, WeightBounds};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, instrument, warn};

/// L2 regularization applied to the user-facing solve.
pub const L2_GAMMA: f64 = 0.3;
/// With more than this many assets every asset keeps a minimum weight.
const FLOOR_ASSET_COUNT: usize = 3;
const FLOOR_WEIGHT: f64 = 0.05;
const MAX_PLAUSIBLE_RETURN: f64 = 1.0;
const MAX_PLAUSIBLE_SHARPE: f64 = 3.0;

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationRequest {
    /// Symbol to amount held.
    pub holdings: BTreeMap<String, f64>,
    pub risk_method: RiskMethod,
    pub preferences: Preferences,
    pub lookback_days: u32,
    pub risk_free_rate: f64,
    pub unit_size: f64,
    pub allow_multi_source: bool,
}

impl OptimizationRequest {
    pub fn new(holdings: BTreeMap<String, f64>) -> Self {
        Self {
            holdings,
            risk_method: RiskMethod::default(),
            preferences: Preferences::default(),
            lookback_days: 60,
            risk_free_rate: 0.02,
            unit_size: 1.0,
            allow_multi_source: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InsufficientInput,
    DataUnavailable,
    SolverFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationResult {
    pub weights: Option<BTreeMap<String, f64>>,
    pub expected_return: Option<f64>,
    pub volatility: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    /// The objective actually solved, after falling back for missing targets.
    pub risk_method: RiskMethod,
    pub efficient_frontier: Vec<FrontierPoint>,
    pub assets: Vec<String>,
    pub correlation_matrix: Vec<Vec<Option<f64>>>,
    pub historical_returns: Option<CumulativeReturns>,
    pub rolling_metrics: Option<RollingMetrics>,
    pub allocation: Option<DiscreteAllocation>,
    pub total_value: Option<f64>,
    pub note: Option<String>,
    pub missing_symbols: Vec<String>,
    pub quality_issues: Vec<QualityIssue>,
    pub lookback_days: u32,
    pub failure: Option<FailureKind>,
}

impl OptimizationResult {
    fn failed(
        kind: FailureKind,
        note: String,
        request: &OptimizationRequest,
        missing_symbols: Vec<String>,
    ) -> Self {
        warn!("Optimization aborted ({:?}): {}", kind, note);
        Self {
            weights: None,
            expected_return: None,
            volatility: None,
            sharpe_ratio: None,
            risk_method: request.risk_method,
            efficient_frontier: Vec::new(),
            assets: Vec::new(),
            correlation_matrix: Vec::new(),
            historical_returns: None,
            rolling_metrics: None,
            allocation: None,
            total_value: None,
            note: Some(note),
            missing_symbols,
            quality_issues: Vec::new(),
            lookback_days: request.lookback_days,
            failure: Some(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Uppercased symbols with a positive amount, summed when repeated.
fn positive_holdings(holdings: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    for (symbol, amount) in holdings {
        if amount.is_finite() && *amount > 0.0 {
            *out.entry(symbol.trim().to_uppercase()).or_insert(0.0) += amount;
        }
    }
    out
}

fn objective_for(method: RiskMethod, prefs: &Preferences) -> (RiskMethod, Objective) {
    match (method, prefs.target_volatility, prefs.target_return) {
        (RiskMethod::MinVolatility, _, _) => (method, Objective::MinVolatility),
        (RiskMethod::EfficientRisk, Some(target), _) => (method, Objective::EfficientRisk(target)),
        (RiskMethod::EfficientReturn, _, Some(target)) => {
            (method, Objective::EfficientReturn(target))
        }
        (RiskMethod::MaxSharpe, _, _) => (method, Objective::MaxSharpe),
        _ => {
            warn!("{} needs a target, using max_sharpe", method);
            (RiskMethod::MaxSharpe, Objective::MaxSharpe)
        }
    }
}

fn missing_note(missing: &[String]) -> String {
    if missing.is_empty() {
        String::new()
    } else {
        format!(" Missing data for: {}.", missing.join(", "))
    }
}

/// Cleans solver output with the user's minimum weight as cutoff. The cutoff
/// never exceeds the per-asset cap, or every capped weight would be dropped.
fn finalize_weights(
    assets: &[String],
    raw: &DVector<f64>,
    prefs: &Preferences,
) -> Result<BTreeMap<String, f64>, String> {
    let cutoff = prefs.effective_min_weight().min(prefs.effective_max_weight());
    let weights = solver::clean_weights(assets, raw, cutoff);
    if weights.is_empty() {
        return Err(format!(
            "Every optimized weight fell below the minimum weight of {:.2}%.",
            cutoff * 100.0
        ));
    }
    Ok(weights)
}

/// Runs the full pipeline: live prices, history, validation, estimation,
/// solving, frontier, allocation and analytics. Never fails; problems are
/// reported through [`OptimizationResult::failure`] and the note.
pub async fn optimize_portfolio(
    ctx: &DataContext,
    request: &OptimizationRequest,
) -> OptimizationResult {
    optimize_portfolio_with_progress(ctx, request, &|_: &str| {}).await
}

#[instrument(skip_all, fields(method = %request.risk_method, lookback = request.lookback_days))]
pub async fn optimize_portfolio_with_progress(
    ctx: &DataContext,
    request: &OptimizationRequest,
    progress: &(dyn Fn(&str) + Sync),
) -> OptimizationResult {
    let holdings = positive_holdings(&request.holdings);
    if holdings.len() < 2 {
        return OptimizationResult::failed(
            FailureKind::InsufficientInput,
            "At least 2 different assets are required for optimization.".to_string(),
            request,
            Vec::new(),
        );
    }
    let symbols: Vec<String> = holdings.keys().cloned().collect();

    let prices = get_live_prices(ctx, &symbols, request.allow_multi_source).await;
    if prices.is_empty() {
        let (_, unknown) = resolve(&symbols);
        return OptimizationResult::failed(
            FailureKind::DataUnavailable,
            format!("No live price data available.{}", missing_note(&unknown)),
            request,
            unknown,
        );
    }

    let (matrix, missing) = get_historical_prices(
        ctx,
        &symbols,
        request.lookback_days,
        request.allow_multi_source,
        progress,
    )
    .await;
    if matrix.is_empty() || matrix.n_cols() < 2 {
        return OptimizationResult::failed(
            FailureKind::DataUnavailable,
            format!(
                "Not enough historical data for optimization.{}",
                missing_note(&missing)
            ),
            request,
            missing,
        );
    }

    let report = validate_price_matrix(&matrix, request.lookback_days);
    if report.insufficient {
        let reasons: Vec<String> = report.issues.iter().map(ToString::to_string).collect();
        return OptimizationResult::failed(
            FailureKind::DataUnavailable,
            format!("{}.{}", reasons.join("; "), missing_note(&missing)),
            request,
            missing,
        );
    }
    let cleaned = report.cleaned;
    let assets = cleaned.symbols().to_vec();
    info!("Optimizing {} assets: {}", assets.len(), assets.join(", "));

    let simple = returns::complete_rows(&cleaned.simple_returns());
    let log = returns::complete_rows(&cleaned.log_returns());
    let mu = returns::expected_returns(&simple, &log, request.lookback_days, request.risk_free_rate);
    let (sigma, _) = risk::ledoit_wolf(&simple);

    let prefs = request.preferences;
    let lower = if assets.len() > FLOOR_ASSET_COUNT {
        FLOOR_WEIGHT
    } else {
        0.0
    };
    let bounds = WeightBounds::new(lower, prefs.effective_max_weight());
    let (method, objective) = objective_for(request.risk_method, &prefs);

    let raw = match solver::optimize(
        &mu,
        &sigma,
        objective,
        bounds,
        L2_GAMMA,
        request.risk_free_rate,
    ) {
        Ok(w) => w,
        Err(e) => {
            let mut failed = OptimizationResult::failed(
                FailureKind::SolverFailure,
                format!("Optimization failed: {e}.{}", missing_note(&missing)),
                request,
                missing,
            );
            failed.risk_method = method;
            failed.quality_issues = report.issues;
            return failed;
        }
    };

    let weights = match finalize_weights(&assets, &raw, &prefs) {
        Ok(weights) => weights,
        Err(reason) => {
            let mut failed = OptimizationResult::failed(
                FailureKind::SolverFailure,
                format!("{reason}{}", missing_note(&missing)),
                request,
                missing,
            );
            failed.risk_method = method;
            failed.quality_issues = report.issues;
            return failed;
        }
    };
    let cleaned_vec = DVector::from_iterator(
        assets.len(),
        assets.iter().map(|s| weights.get(s).copied().unwrap_or(0.0)),
    );
    let perf = solver::performance(&cleaned_vec, &mu, &sigma, request.risk_free_rate);

    let total_value = portfolio_value(&holdings, &prices);
    let allocation = greedy_allocation(&weights, &prices, total_value, request.unit_size);
    let efficient_frontier = frontier::efficient_frontier(&mu, &sigma, request.risk_free_rate);

    let mut notes = Vec::new();
    if perf.expected_return > MAX_PLAUSIBLE_RETURN {
        notes.push(format!(
            "Warning: expected return of {:.0}% seems unrealistic, results may be unreliable.",
            perf.expected_return * 100.0
        ));
    } else if perf.sharpe_ratio > MAX_PLAUSIBLE_SHARPE {
        notes.push(format!(
            "Warning: Sharpe ratio of {:.2} seems unrealistic, results may be unreliable.",
            perf.sharpe_ratio
        ));
    }
    if !report.issues.is_empty() {
        let issues: Vec<String> = report.issues.iter().map(ToString::to_string).collect();
        notes.push(format!("Data quality issues detected: {}.", issues.join("; ")));
    }
    if !report.is_valid {
        notes.push(
            "Price data failed validation, so these results carry reduced confidence.".to_string(),
        );
    }
    if !missing.is_empty() {
        notes.push(format!("Missing data for: {}.", missing.join(", ")));
    }

    info!(
        expected_return = perf.expected_return,
        volatility = perf.volatility,
        sharpe = perf.sharpe_ratio,
        "Optimization complete"
    );
    OptimizationResult {
        weights: Some(weights),
        expected_return: Some(perf.expected_return),
        volatility: Some(perf.volatility),
        sharpe_ratio: Some(perf.sharpe_ratio),
        risk_method: method,
        efficient_frontier,
        correlation_matrix: analytics::correlation_matrix(&simple),
        historical_returns: Some(analytics::cumulative_returns(&cleaned)),
        rolling_metrics: Some(analytics::rolling_metrics(
            &cleaned,
            request.risk_free_rate,
            ROLLING_WINDOW,
        )),
        assets,
        allocation,
        total_value: Some(total_value),
        note: (!notes.is_empty()).then(|| notes.join(" ")),
        missing_symbols: missing,
        quality_issues: report.issues,
        lookback_days: request.lookback_days,
        failure: None,
    }
}

/// Live prices of `holdings` valued in USD, skipping symbols without a price.
pub fn portfolio_value(holdings: &BTreeMap<String, f64>, prices: &HashMap<String, f64>) -> f64 {
    positive_holdings(holdings)
        .iter()
        .filter_map(|(s, amount)| prices.get(s).map(|p| amount * p))
        .sum()
}

//! User optimization preferences and risk objectives.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;

pub const DEFAULT_MAX_WEIGHT: f64 = 0.6;
pub const DEFAULT_MIN_WEIGHT: f64 = 0.05;
/// Hard cap on any single asset, whatever the user asks for.
pub const MAX_WEIGHT_CAP: f64 = 0.8;
pub const MIN_WEIGHT_FLOOR: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub max_weight: f64,
    pub min_weight: f64,
    pub target_volatility: Option<f64>,
    pub target_return: Option<f64>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            max_weight: DEFAULT_MAX_WEIGHT,
            min_weight: DEFAULT_MIN_WEIGHT,
            target_volatility: None,
            target_return: None,
        }
    }
}

fn unit_weight(value: Option<&Value>) -> Option<f64> {
    value
        .and_then(Value::as_f64)
        .filter(|w| w.is_finite() && *w > 0.0 && *w <= 1.0)
}

fn positive(value: Option<&Value>) -> Option<f64> {
    value
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite() && *v > 0.0)
}

impl Preferences {
    /// Builds preferences from untrusted input. Anything malformed falls back
    /// to the default for that field.
    pub fn from_json(value: &Value) -> Self {
        let defaults = Self::default();
        let Some(obj) = value.as_object() else {
            return defaults;
        };
        Self {
            max_weight: unit_weight(obj.get("max_weight")).unwrap_or(defaults.max_weight),
            min_weight: unit_weight(obj.get("min_weight")).unwrap_or(defaults.min_weight),
            target_volatility: positive(obj.get("target_volatility")),
            target_return: positive(obj.get("target_return")),
        }
    }

    pub fn effective_max_weight(&self) -> f64 {
        self.max_weight.min(MAX_WEIGHT_CAP)
    }

    pub fn effective_min_weight(&self) -> f64 {
        self.min_weight.max(MIN_WEIGHT_FLOOR)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskMethod {
    #[default]
    MaxSharpe,
    MinVolatility,
    EfficientRisk,
    EfficientReturn,
}

impl RiskMethod {
    pub const ALL: [RiskMethod; 4] = [
        RiskMethod::MaxSharpe,
        RiskMethod::MinVolatility,
        RiskMethod::EfficientRisk,
        RiskMethod::EfficientReturn,
    ];

    /// Unknown names map to `MaxSharpe`.
    pub fn parse(name: &str) -> Self {
        let name = name.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == name)
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskMethod::MaxSharpe => "max_sharpe",
            RiskMethod::MinVolatility => "min_volatility",
            RiskMethod::EfficientRisk => "efficient_risk",
            RiskMethod::EfficientReturn => "efficient_return",
        }
    }
}

impl Display for RiskMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

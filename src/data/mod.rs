//! Resilient market-data acquisition and validation.

pub mod feed;
pub mod history;
pub mod matrix;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;

pub use feed::get_live_prices;
pub use history::get_historical_prices;
pub use matrix::PriceMatrix;
pub use validate::{QualityIssue, ValidationReport, validate_price_matrix};

//! Core business logic abstractions

pub mod cache;
pub mod coins;
pub mod config;
pub mod context;
pub mod log;
pub mod preferences;
pub mod price;

// Re-export main types for cleaner imports
pub use context::DataContext;
pub use preferences::{Preferences, RiskMethod};
pub use price::{PricePoint, PriceSeries, PriceSource, ProviderError};

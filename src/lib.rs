pub mod cli;
pub mod core;
pub mod data;
pub mod optimize;
pub mod providers;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::{DataContext, Preferences, RiskMethod};
use crate::optimize::OptimizationRequest;
use anyhow::{Context, Result};
use tracing::{debug, info};

/// Options of the `optimize` command. Unset values come from the config file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptimizeArgs {
    pub holdings: Vec<(String, f64)>,
    pub risk_method: Option<String>,
    pub lookback_days: Option<u32>,
    pub risk_free_rate: Option<f64>,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Coins,
    Prices { symbols: Vec<String> },
    Quality { symbols: Vec<String>, days: u32, json: bool },
    Optimize(OptimizeArgs),
}

/// Merges command-line options over the configured optimizer settings.
/// Holdings given on the command line replace the configured ones.
pub fn build_request(config: &AppConfig, args: &OptimizeArgs) -> OptimizationRequest {
    let holdings = if args.holdings.is_empty() {
        config.holdings.clone()
    } else {
        args.holdings.iter().cloned().collect()
    };
    let opt = &config.optimizer;
    OptimizationRequest {
        holdings,
        risk_method: RiskMethod::parse(args.risk_method.as_deref().unwrap_or(&opt.risk_method)),
        preferences: Preferences::from_json(&config.preferences),
        lookback_days: args.lookback_days.unwrap_or(opt.lookback_days),
        risk_free_rate: args.risk_free_rate.unwrap_or(opt.risk_free_rate),
        unit_size: opt.unit_size,
        allow_multi_source: opt.allow_multi_source,
    }
}

fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");
    Ok(config)
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    if command == AppCommand::Coins {
        cli::coins::run();
        return Ok(());
    }

    let config = load_config(config_path)?;
    let ctx = DataContext::from_config(&config).context("Failed to set up data sources")?;
    let allow_multi = config.optimizer.allow_multi_source;

    match command {
        AppCommand::Coins => Ok(()),
        AppCommand::Prices { symbols } => cli::prices::run(&ctx, &symbols, allow_multi).await,
        AppCommand::Quality {
            symbols,
            days,
            json,
        } => cli::quality::run(&ctx, &symbols, days, allow_multi, json).await,
        AppCommand::Optimize(args) => {
            let request = build_request(&config, &args);
            info!(
                "Optimizing {} holdings with {}",
                request.holdings.len(),
                request.risk_method
            );
            cli::optimize::run(&ctx, &request, args.json).await
        }
    }
}

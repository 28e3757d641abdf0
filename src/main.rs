use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use coinfolio::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

fn parse_holding(s: &str) -> Result<(String, f64), String> {
    let (symbol, amount) = s
        .split_once('=')
        .ok_or_else(|| format!("expected SYMBOL=AMOUNT, got '{s}'"))?;
    let amount: f64 = amount
        .trim()
        .parse()
        .map_err(|e| format!("invalid amount '{amount}': {e}"))?;
    Ok((symbol.trim().to_uppercase(), amount))
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// List supported coins
    Coins,
    /// Display live USD prices
    Prices {
        #[arg(required = true, value_delimiter = ',')]
        symbols: Vec<String>,
    },
    /// Report historical data availability and quality
    Quality {
        #[arg(required = true, value_delimiter = ',')]
        symbols: Vec<String>,
        /// Days of history to check
        #[arg(short, long, default_value_t = 60)]
        days: u32,
        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },
    /// Optimize portfolio weights
    Optimize {
        /// Holding as SYMBOL=AMOUNT, repeatable; replaces configured holdings
        #[arg(long = "holding", value_parser = parse_holding)]
        holdings: Vec<(String, f64)>,
        /// max_sharpe, min_volatility, efficient_risk or efficient_return
        #[arg(short, long)]
        risk: Option<String>,
        /// Days of history to use
        #[arg(short, long)]
        lookback: Option<u32>,
        /// Annual risk-free rate
        #[arg(long)]
        risk_free: Option<f64>,
        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },
}

impl From<Commands> for coinfolio::AppCommand {
    fn from(cmd: Commands) -> coinfolio::AppCommand {
        match cmd {
            Commands::Coins => coinfolio::AppCommand::Coins,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
            Commands::Prices { symbols } => coinfolio::AppCommand::Prices { symbols },
            Commands::Quality {
                symbols,
                days,
                json,
            } => coinfolio::AppCommand::Quality {
                symbols,
                days,
                json,
            },
            Commands::Optimize {
                holdings,
                risk,
                lookback,
                risk_free,
                json,
            } => coinfolio::AppCommand::Optimize(coinfolio::OptimizeArgs {
                holdings,
                risk_method: risk,
                lookback_days: lookback,
                risk_free_rate: risk_free,
                json,
            }),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => coinfolio::cli::setup::setup(),
        Some(cmd) => coinfolio::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

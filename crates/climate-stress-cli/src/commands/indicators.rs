use clap::Args;

use climate_stress_core::indicators::green;
use climate_stress_core::portfolio::loan::Portfolio;

use super::{load_portfolio_rows, CommandOutput};

/// Arguments for green portfolio indicators
#[derive(Args)]
pub struct IndicatorsArgs {
    /// Portfolio file (CSV or JSON). JSON may be piped on stdin instead
    #[arg(long)]
    pub portfolio: Option<String>,
}

pub fn run_indicators(args: IndicatorsArgs) -> Result<CommandOutput, Box<dyn std::error::Error>> {
    let portfolio = Portfolio::load(load_portfolio_rows(args.portfolio.as_deref())?)?;
    let result = green::calculate_green_indicators(&portfolio)?;
    Ok(serde_json::to_value(result)?.into())
}

use clap::Args;
use serde_json::{json, Value};

use climate_stress_core::config::{MissingShockPolicy, StressTestConfig};
use climate_stress_core::portfolio::loan::Portfolio;
use climate_stress_core::scenarios::registry::ScenarioRegistry;
use climate_stress_core::var::climate_var::validate_confidence_level;
use climate_stress_core::ErrorCategory;

use super::run::MissingShockArg;
use super::{load_portfolio_rows, CommandOutput};
use crate::input;

/// Arguments for input validation
#[derive(Args)]
pub struct ValidateArgs {
    /// Portfolio file (CSV or JSON). JSON may be piped on stdin instead
    #[arg(long)]
    pub portfolio: Option<String>,

    /// Scenario definitions to check for sector coverage
    #[arg(long)]
    pub scenarios: Option<String>,

    /// Run configuration (JSON or YAML)
    #[arg(long)]
    pub config: Option<String>,

    /// Override the configured missing-shock policy
    #[arg(long, value_enum)]
    pub missing_shock: Option<MissingShockArg>,
}

/// Load and check every input without running a scenario. Sectors a
/// scenario does not shock are reported; under the `raise` policy they
/// make the inputs invalid.
pub fn run_validate(args: ValidateArgs) -> Result<CommandOutput, Box<dyn std::error::Error>> {
    let mut config: StressTestConfig = match args.config {
        Some(ref path) => input::file::read_structured(path)?,
        None => StressTestConfig::default(),
    };
    if let Some(policy) = args.missing_shock {
        config.missing_shock_policy = policy.into();
    }
    config.validate()?;
    validate_confidence_level(config.confidence_level)?;

    let portfolio = Portfolio::load(load_portfolio_rows(args.portfolio.as_deref())?)?;
    let sectors = portfolio.sectors();

    let mut failure = None;
    let mut coverage: Vec<Value> = Vec::new();
    if let Some(ref path) = args.scenarios {
        let defs = input::file::read_scenarios(path)?;
        let registry = ScenarioRegistry::from_definitions(&defs, config.missing_shock_policy)?;
        for scenario in registry.scenarios() {
            let missing: Vec<&str> = sectors
                .iter()
                .copied()
                .filter(|s| scenario.shock(s).is_none())
                .collect();
            if !missing.is_empty() {
                tracing::warn!(scenario = %scenario.name, missing = ?missing, "sectors without a shock");
                if config.missing_shock_policy == MissingShockPolicy::Raise && failure.is_none() {
                    failure = Some(ErrorCategory::Configuration);
                }
            }
            coverage.push(json!({
                "scenario": scenario.name,
                "shocked_sectors": scenario.shocks().len(),
                "missing_sectors": missing,
            }));
        }
    }

    let value = json!({
        "valid": failure.is_none(),
        "loan_count": portfolio.len(),
        "total_ead": portfolio.total_ead()?.to_string(),
        "sectors": sectors,
        "missing_shock_policy": config.missing_shock_policy,
        "scenarios": coverage,
    });
    Ok(CommandOutput { value, failure })
}

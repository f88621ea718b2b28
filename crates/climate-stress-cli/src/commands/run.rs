use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use std::path::Path;

use climate_stress_core::config::{MissingShockPolicy, StressTestConfig, VarMethod};
use climate_stress_core::stress_test::runner::{run_stress_test, StressTestInput};

use super::{load_portfolio_rows, CommandOutput};
use crate::input;
use crate::output;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MissingShockArg {
    /// Fail the scenario when a portfolio sector has no shock
    Raise,
    /// Apply the neutral shock (1.0, 1.0) and warn
    Neutral,
}

impl From<MissingShockArg> for MissingShockPolicy {
    fn from(arg: MissingShockArg) -> Self {
        match arg {
            MissingShockArg::Raise => MissingShockPolicy::Raise,
            MissingShockArg::Neutral => MissingShockPolicy::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum VarMethodArg {
    /// Nearest-rank quantile of per-loan expected losses
    LoanQuantile,
    /// Quantile of Monte Carlo aggregate losses (Bernoulli defaults)
    Simulated,
}

impl From<VarMethodArg> for VarMethod {
    fn from(arg: VarMethodArg) -> Self {
        match arg {
            VarMethodArg::LoanQuantile => VarMethod::LoanQuantile,
            VarMethodArg::Simulated => VarMethod::Simulated,
        }
    }
}

/// Arguments for a stress test run
#[derive(Args)]
pub struct RunArgs {
    /// Portfolio file (CSV or JSON). JSON may be piped on stdin instead
    #[arg(long)]
    pub portfolio: Option<String>,

    /// Scenario definitions (JSON, YAML, or a CSV uplift table)
    #[arg(long)]
    pub scenarios: String,

    /// Run configuration (JSON or YAML); the flags below override it
    #[arg(long)]
    pub config: Option<String>,

    /// VaR confidence level (e.g. 0.95)
    #[arg(long)]
    pub alpha: Option<Decimal>,

    /// Policy for portfolio sectors a scenario does not shock
    #[arg(long, value_enum)]
    pub missing_shock: Option<MissingShockArg>,

    /// Upper bound for stressed PD
    #[arg(long)]
    pub pd_cap: Option<Decimal>,

    /// Climate VaR method
    #[arg(long, value_enum)]
    pub var_method: Option<VarMethodArg>,

    /// Number of Monte Carlo draws (simulated VaR)
    #[arg(long)]
    pub simulations: Option<u32>,

    /// Base RNG seed (simulated VaR)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Run only the named scenario (repeatable)
    #[arg(long = "scenario", value_name = "NAME")]
    pub only: Vec<String>,

    /// Write per-scenario CSV results into this directory
    #[arg(long)]
    pub outdir: Option<String>,
}

fn build_config(args: &RunArgs) -> Result<StressTestConfig, Box<dyn std::error::Error>> {
    let mut config: StressTestConfig = match args.config {
        Some(ref path) => input::file::read_structured(path)?,
        None => StressTestConfig::default(),
    };

    if let Some(alpha) = args.alpha {
        config.confidence_level = alpha;
    }
    if let Some(policy) = args.missing_shock {
        config.missing_shock_policy = policy.into();
    }
    if let Some(cap) = args.pd_cap {
        config.pd_cap = cap;
    }
    if let Some(method) = args.var_method {
        config.var_method = method.into();
    }
    if let Some(n) = args.simulations {
        config.simulation.num_simulations = n;
    }
    if let Some(seed) = args.seed {
        config.simulation.seed = seed;
    }
    if !args.only.is_empty() {
        config.scenarios = Some(args.only.clone());
    }
    Ok(config)
}

pub fn run_stress(args: RunArgs) -> Result<CommandOutput, Box<dyn std::error::Error>> {
    let config = build_config(&args)?;
    let loans = load_portfolio_rows(args.portfolio.as_deref())?;
    let scenarios = input::file::read_scenarios(&args.scenarios)?;
    tracing::debug!(
        loans = loans.len(),
        scenarios = scenarios.len(),
        "inputs read"
    );

    let stress_input = StressTestInput {
        loans,
        scenarios,
        config,
    };
    let output = run_stress_test(&stress_input)?;
    let result = &output.result;

    tracing::info!(
        loans = result.loan_count,
        total_ead = %result.total_ead,
        "portfolio loaded"
    );
    for summary in &result.scenario_summaries {
        if let (Some(loss), Some(var)) = (&summary.aggregate_expected_loss, &summary.climate_var) {
            tracing::info!(
                scenario = %summary.scenario,
                aggregate_expected_loss = %loss,
                climate_var = %var.var,
                "scenario complete"
            );
        }
    }
    if let Some(ref cross) = result.cross_scenario_var {
        tracing::info!(
            alpha = %cross.confidence_level,
            climate_var = %cross.var,
            "cross-scenario Climate VaR"
        );
    }

    if let Some(ref dir) = args.outdir {
        let written = output::files::write_results(Path::new(dir), result)?;
        tracing::info!(files = written.len(), outdir = %dir, "outputs written");
    }

    let failure = result.first_failure_category();
    Ok(CommandOutput {
        value: serde_json::to_value(&output)?,
        failure,
    })
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Instant;

use crate::config::{StressTestConfig, VarMethod};
use crate::error::{ClimateStressError, ErrorCategory};
use crate::loss::engine::{portfolio_loss, LoanLoss, LossDistribution};
use crate::portfolio::loan::{LoanRow, Portfolio};
use crate::scenarios::registry::{Scenario, ScenarioDefinition, ScenarioRegistry};
use crate::stress_test::breakdown::{summarize, BreakdownRow, Dimension};
use crate::types::{with_metadata, ComputationOutput, Money};
use crate::var::climate_var::{
    cross_scenario_var, validate_confidence_level, value_at_risk, ClimateVarResult,
};
use crate::ClimateStressResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Everything a stress test run needs, as handed over by the I/O layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressTestInput {
    pub loans: Vec<LoanRow>,
    pub scenarios: Vec<ScenarioDefinition>,
    #[serde(default)]
    pub config: StressTestConfig,
}

/// One (scenario, loan) row of the result table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanResultRow {
    pub scenario: String,
    #[serde(flatten)]
    pub loss: LoanLoss,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScenarioStatus {
    Succeeded,
    Failed {
        category: ErrorCategory,
        reason: String,
    },
}

/// One summary row per scenario. The loss fields are absent when the
/// scenario failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub scenario: String,
    #[serde(flatten)]
    pub status: ScenarioStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate_expected_loss: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incremental_loss: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub climate_var: Option<ClimateVarResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_sectors: Vec<String>,
}

impl ScenarioSummary {
    pub fn is_success(&self) -> bool {
        self.status == ScenarioStatus::Succeeded
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioBreakdown {
    pub scenario: String,
    pub dimension: Dimension,
    pub rows: Vec<BreakdownRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressTestOutput {
    pub loan_count: usize,
    pub total_ead: Money,
    pub loan_results: Vec<LoanResultRow>,
    pub scenario_summaries: Vec<ScenarioSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cross_scenario_var: Option<ClimateVarResult>,
    pub breakdowns: Vec<ScenarioBreakdown>,
}

impl StressTestOutput {
    pub fn failures(&self) -> impl Iterator<Item = &ScenarioSummary> {
        self.scenario_summaries.iter().filter(|s| !s.is_success())
    }

    /// Category of the first failed scenario in name order.
    pub fn first_failure_category(&self) -> Option<ErrorCategory> {
        self.failures().find_map(|s| match &s.status {
            ScenarioStatus::Failed { category, .. } => Some(*category),
            ScenarioStatus::Succeeded => None,
        })
    }
}

/// Result of stressing a single scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioRun {
    pub distribution: LossDistribution,
    pub var: ClimateVarResult,
}

// ---------------------------------------------------------------------------
// Single scenario
// ---------------------------------------------------------------------------

/// Loss distribution and Climate VaR for one scenario. `scenario_index` is
/// the scenario's position in name order; in simulated mode the RNG is
/// seeded with `seed + scenario_index` so results do not depend on which
/// thread ran the scenario.
pub fn stress_scenario(
    portfolio: &Portfolio,
    registry: &ScenarioRegistry,
    scenario: &Scenario,
    config: &StressTestConfig,
    scenario_index: usize,
) -> ClimateStressResult<ScenarioRun> {
    let distribution = portfolio_loss(portfolio, registry, scenario, config.pd_cap)?;
    let var = match config.var_method {
        VarMethod::LoanQuantile => value_at_risk(&distribution, config.confidence_level)?,
        VarMethod::Simulated => simulated_var(&distribution, config, scenario_index)?,
        VarMethod::CrossScenario => {
            return Err(ClimateStressError::validation(
                "var_method",
                "cross_scenario is not a per-scenario method",
            ))
        }
    };
    Ok(ScenarioRun { distribution, var })
}

#[cfg(feature = "stochastic")]
fn simulated_var(
    distribution: &LossDistribution,
    config: &StressTestConfig,
    scenario_index: usize,
) -> ClimateStressResult<ClimateVarResult> {
    use crate::loss::simulation::simulate_with_seed;
    use crate::var::climate_var::value_at_risk_from_samples;

    validate_confidence_level(config.confidence_level)?;
    let seed = config.simulation.seed.wrapping_add(scenario_index as u64);
    let samples = simulate_with_seed(distribution, config.simulation.num_simulations, seed)?;
    value_at_risk_from_samples(distribution, &samples, config.confidence_level)
}

#[cfg(not(feature = "stochastic"))]
fn simulated_var(
    _distribution: &LossDistribution,
    _config: &StressTestConfig,
    _scenario_index: usize,
) -> ClimateStressResult<ClimateVarResult> {
    Err(ClimateStressError::validation(
        "var_method",
        "simulated VaR requires the `stochastic` feature",
    ))
}

// ---------------------------------------------------------------------------
// Full run
// ---------------------------------------------------------------------------

/// Validate the input and stress every selected scenario.
///
/// Portfolio, scenario-definition and configuration errors abort the run.
/// Failures inside a scenario are recorded in its summary and the remaining
/// scenarios still complete.
pub fn run_stress_test(
    input: &StressTestInput,
) -> ClimateStressResult<ComputationOutput<StressTestOutput>> {
    input.config.validate()?;
    let portfolio = Portfolio::load(input.loans.iter().cloned())?;
    let registry =
        ScenarioRegistry::from_definitions(&input.scenarios, input.config.missing_shock_policy)?;
    run_scenarios(&portfolio, &registry, &input.config)
}

/// Stress already-validated inputs. Sector lookups follow the registry's
/// missing-shock policy.
pub fn run_scenarios(
    portfolio: &Portfolio,
    registry: &ScenarioRegistry,
    config: &StressTestConfig,
) -> ClimateStressResult<ComputationOutput<StressTestOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    config.validate()?;
    let selected = select_scenarios(registry, config)?;
    let total_ead = portfolio.total_ead()?;

    tracing::info!(
        loans = portfolio.len(),
        scenarios = selected.len(),
        var_method = ?config.var_method,
        "stress test started"
    );

    if portfolio.is_empty() {
        warnings.push("Portfolio is empty; all losses and VaR figures are zero.".into());
    }

    let runs = execute(portfolio, registry, &selected, config);

    let mut loan_results = Vec::new();
    let mut scenario_summaries = Vec::with_capacity(selected.len());
    let mut breakdowns = Vec::new();
    let mut aggregates: Vec<Money> = Vec::new();

    for (scenario, run) in selected.iter().zip(runs) {
        match run {
            Ok(ScenarioRun { distribution, var }) => {
                if !distribution.fallback_sectors.is_empty() {
                    warnings.push(format!(
                        "Scenario '{}': neutral shock applied to sectors without an entry: {}",
                        scenario.name,
                        distribution.fallback_sectors.join(", ")
                    ));
                }
                for dimension in Dimension::ALL {
                    breakdowns.push(ScenarioBreakdown {
                        scenario: scenario.name.clone(),
                        dimension,
                        rows: summarize(&distribution.loan_losses, dimension)?,
                    });
                }
                aggregates.push(distribution.aggregate_loss);
                scenario_summaries.push(ScenarioSummary {
                    scenario: scenario.name.clone(),
                    status: ScenarioStatus::Succeeded,
                    aggregate_expected_loss: Some(distribution.aggregate_loss),
                    incremental_loss: Some(distribution.incremental_loss),
                    climate_var: Some(var),
                    fallback_sectors: distribution.fallback_sectors,
                });
                loan_results.extend(distribution.loan_losses.into_iter().map(|loss| {
                    LoanResultRow {
                        scenario: scenario.name.clone(),
                        loss,
                    }
                }));
            }
            Err(e) => {
                tracing::warn!(scenario = %scenario.name, error = %e, "scenario failed");
                warnings.push(format!("Scenario '{}' failed: {}", scenario.name, e));
                scenario_summaries.push(ScenarioSummary {
                    scenario: scenario.name.clone(),
                    status: ScenarioStatus::Failed {
                        category: e.category(),
                        reason: e.to_string(),
                    },
                    aggregate_expected_loss: None,
                    incremental_loss: None,
                    climate_var: None,
                    fallback_sectors: Vec::new(),
                });
            }
        }
    }

    let cross_scenario = if validate_confidence_level(config.confidence_level).is_ok() {
        cross_scenario_var(&aggregates, config.confidence_level)?
    } else {
        None
    };

    let output = StressTestOutput {
        loan_count: portfolio.len(),
        total_ead,
        loan_results,
        scenario_summaries,
        cross_scenario_var: cross_scenario,
        breakdowns,
    };

    tracing::info!(
        succeeded = output.scenario_summaries.iter().filter(|s| s.is_success()).count(),
        failed = output.failures().count(),
        "stress test finished"
    );

    let elapsed = start.elapsed().as_micros() as u64;
    let assumptions = serde_json::json!({
        "confidence_level": config.confidence_level.to_string(),
        "var_method": config.var_method,
        "quantile_convention": "nearest-rank: smallest value with cumulative proportion >= alpha, rank ceil(alpha * n)",
        "missing_shock_policy": registry.missing_shock_policy(),
        "pd_cap": config.pd_cap.to_string(),
        "expected_loss": "EAD * stressed PD * stressed LGD",
        "incremental_loss": "EAD * max(stressed PD - PD0, 0) * stressed LGD",
        "simulation": match config.var_method {
            VarMethod::Simulated => serde_json::to_value(&config.simulation).unwrap_or_default(),
            _ => serde_json::Value::Null,
        },
    });

    Ok(with_metadata(
        "Climate credit stress test (sector shocks on PD/LGD, Climate VaR)",
        &assumptions,
        warnings,
        elapsed,
        output,
    ))
}

/// Scenarios to run, deduplicated and in name order. Unknown names abort.
fn select_scenarios<'a>(
    registry: &'a ScenarioRegistry,
    config: &StressTestConfig,
) -> ClimateStressResult<Vec<&'a Scenario>> {
    match &config.scenarios {
        Some(names) => {
            let unique: BTreeSet<&str> = names.iter().map(|n| n.trim()).collect();
            unique.into_iter().map(|n| registry.get(n)).collect()
        }
        None => Ok(registry.scenarios().collect()),
    }
}

#[cfg(feature = "parallel")]
fn execute(
    portfolio: &Portfolio,
    registry: &ScenarioRegistry,
    scenarios: &[&Scenario],
    config: &StressTestConfig,
) -> Vec<ClimateStressResult<ScenarioRun>> {
    use rayon::prelude::*;

    scenarios
        .par_iter()
        .enumerate()
        .map(|(i, scenario)| stress_scenario(portfolio, registry, scenario, config, i))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn execute(
    portfolio: &Portfolio,
    registry: &ScenarioRegistry,
    scenarios: &[&Scenario],
    config: &StressTestConfig,
) -> Vec<ClimateStressResult<ScenarioRun>> {
    scenarios
        .iter()
        .enumerate()
        .map(|(i, scenario)| stress_scenario(portfolio, registry, scenario, config, i))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

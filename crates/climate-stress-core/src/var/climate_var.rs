use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::VarMethod;
use crate::error::ClimateStressError;
use crate::loss::engine::LossDistribution;
use crate::numeric::{checked_div, checked_mul, checked_sum};
use crate::types::{Money, Rate};
use crate::ClimateStressResult;

/// Label used as the scenario name of the cross-scenario figure.
pub const CROSS_SCENARIO_LABEL: &str = "cross_scenario";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateVarResult {
    pub scenario: String,
    pub confidence_level: Rate,
    pub method: VarMethod,
    pub var: Money,
    /// Aggregate expected loss of the scenario (mean across scenarios for
    /// the cross-scenario figure)
    pub expected_loss: Money,
    /// Number of observations the quantile was taken over
    pub observations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulated_mean: Option<Money>,
}

// ---------------------------------------------------------------------------
// Quantile
// ---------------------------------------------------------------------------

/// α must lie strictly inside (0, 1).
pub fn validate_confidence_level(alpha: Rate) -> ClimateStressResult<()> {
    if alpha <= Decimal::ZERO || alpha >= Decimal::ONE {
        return Err(ClimateStressError::InvalidConfidenceLevel(alpha));
    }
    Ok(())
}

/// Empirical α-quantile, nearest-rank convention: sort ascending and take
/// the smallest value whose cumulative proportion of observations is ≥ α,
/// i.e. the element at 1-based rank ⌈α·n⌉. No interpolation.
///
/// Returns `None` for an empty sample.
pub fn nearest_rank_quantile(values: &[Money], alpha: Rate) -> ClimateStressResult<Option<Money>> {
    validate_confidence_level(alpha)?;
    if values.is_empty() {
        return Ok(None);
    }

    let n = values.len();
    let position = checked_mul(alpha, Decimal::from(n as u64), "quantile rank")?.ceil();
    let rank = position
        .to_usize()
        .ok_or_else(|| ClimateStressError::numeric(format!("quantile rank {position}")))?
        .clamp(1, n);

    let mut sorted = values.to_vec();
    sorted.sort();
    Ok(Some(sorted[rank - 1]))
}

fn mean(values: &[Money], context: &str) -> ClimateStressResult<Money> {
    if values.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let total = checked_sum(values.iter().copied(), context)?;
    checked_div(total, Decimal::from(values.len() as u64), context)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Climate VaR over the scenario's per-loan expected losses (deterministic
/// mode). An empty portfolio has VaR 0.
pub fn value_at_risk(
    distribution: &LossDistribution,
    alpha: Rate,
) -> ClimateStressResult<ClimateVarResult> {
    let losses = distribution.losses();
    let var = nearest_rank_quantile(&losses, alpha)?.unwrap_or(Decimal::ZERO);

    Ok(ClimateVarResult {
        scenario: distribution.scenario.clone(),
        confidence_level: alpha,
        method: VarMethod::LoanQuantile,
        var,
        expected_loss: distribution.aggregate_loss,
        observations: losses.len(),
        simulated_mean: None,
    })
}

/// Climate VaR over pre-generated aggregate-loss draws (stochastic mode).
pub fn value_at_risk_from_samples(
    distribution: &LossDistribution,
    samples: &[Money],
    alpha: Rate,
) -> ClimateStressResult<ClimateVarResult> {
    let var = nearest_rank_quantile(samples, alpha)?.ok_or_else(|| {
        ClimateStressError::validation("samples", "at least one aggregate-loss draw is required")
    })?;

    Ok(ClimateVarResult {
        scenario: distribution.scenario.clone(),
        confidence_level: alpha,
        method: VarMethod::Simulated,
        var,
        expected_loss: distribution.aggregate_loss,
        observations: samples.len(),
        simulated_mean: Some(mean(samples, "simulated mean loss")?),
    })
}

/// Climate VaR across scenarios: the α-quantile of the scenarios' aggregate
/// expected losses. `None` when there are no scenarios.
pub fn cross_scenario_var(
    aggregate_losses: &[Money],
    alpha: Rate,
) -> ClimateStressResult<Option<ClimateVarResult>> {
    let Some(var) = nearest_rank_quantile(aggregate_losses, alpha)? else {
        return Ok(None);
    };

    Ok(Some(ClimateVarResult {
        scenario: CROSS_SCENARIO_LABEL.to_string(),
        confidence_level: alpha,
        method: VarMethod::CrossScenario,
        var,
        expected_loss: mean(aggregate_losses, "mean scenario loss")?,
        observations: aggregate_losses.len(),
        simulated_mean: None,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::numeric::{checked_add, checked_mul};
use crate::portfolio::loan::Portfolio;
use crate::scenarios::registry::{Scenario, ScenarioRegistry, ShockSource};
use crate::stress::propagator::{apply_with_cap, StressedLoan};
use crate::types::{Money, Multiplier, Rate};
use crate::ClimateStressResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Per-loan outcome of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanLoss {
    pub loan_id: String,
    pub sector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub ead: Money,
    pub pd_base: Rate,
    pub pd_stressed: Rate,
    /// max(pd_stressed - pd_base, 0)
    pub delta_pd: Rate,
    pub lgd_base: Rate,
    pub lgd_stressed: Rate,
    pub pd_multiplier: Multiplier,
    pub lgd_multiplier: Multiplier,
    pub shock_source: ShockSource,
    /// EAD × pd_stressed × lgd_stressed
    pub expected_loss: Money,
    /// EAD × delta_pd × lgd_stressed
    pub incremental_loss: Money,
}

/// Loss outcome of one scenario over the whole portfolio. `loan_losses`
/// follows the portfolio's loan order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossDistribution {
    pub scenario: String,
    pub loan_losses: Vec<LoanLoss>,
    pub aggregate_loss: Money,
    pub incremental_loss: Money,
    pub total_ead: Money,
    /// Sectors that received the neutral shock because the scenario had none
    pub fallback_sectors: Vec<String>,
}

impl LossDistribution {
    /// Per-loan expected losses in portfolio order.
    pub fn losses(&self) -> Vec<Money> {
        self.loan_losses.iter().map(|l| l.expected_loss).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.loan_losses.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Loss calculations
// ---------------------------------------------------------------------------

/// EAD × stressed PD × stressed LGD.
pub fn expected_loss(stressed: &StressedLoan<'_>) -> ClimateStressResult<Money> {
    let context = format!("expected loss of loan '{}'", stressed.loan.id);
    let ead_pd = checked_mul(stressed.loan.ead, stressed.stressed_pd, &context)?;
    checked_mul(ead_pd, stressed.stressed_lgd, &context)
}

/// EAD × ΔPD × stressed LGD: the loss attributable to the climate-driven PD
/// increase alone.
pub fn incremental_loss(stressed: &StressedLoan<'_>) -> ClimateStressResult<Money> {
    let context = format!("incremental loss of loan '{}'", stressed.loan.id);
    let ead_dpd = checked_mul(stressed.loan.ead, stressed.delta_pd(), &context)?;
    checked_mul(ead_dpd, stressed.stressed_lgd, &context)
}

/// Stress every loan under the scenario's sector shocks and aggregate.
/// Shocks are looked up through the registry, so its missing-shock policy
/// decides what happens to sectors the scenario does not name. Stressed PD
/// is capped at `pd_cap`.
///
/// An empty portfolio yields an empty distribution with zero aggregate loss.
pub fn portfolio_loss(
    portfolio: &Portfolio,
    registry: &ScenarioRegistry,
    scenario: &Scenario,
    pd_cap: Rate,
) -> ClimateStressResult<LossDistribution> {
    let mut loan_losses = Vec::with_capacity(portfolio.len());
    let mut aggregate_loss = Decimal::ZERO;
    let mut total_incremental = Decimal::ZERO;
    let mut total_ead = Decimal::ZERO;
    let mut fallback_sectors: BTreeSet<String> = BTreeSet::new();

    for loan in portfolio.loans() {
        let resolved = registry.shock_for(scenario, &loan.sector)?;
        if resolved.source == ShockSource::NeutralFallback {
            fallback_sectors.insert(loan.sector.clone());
        }

        let stressed = apply_with_cap(loan, &resolved.factor, pd_cap)?;
        let el = expected_loss(&stressed)?;
        let il = incremental_loss(&stressed)?;

        aggregate_loss = checked_add(aggregate_loss, el, "aggregate expected loss")?;
        total_incremental = checked_add(total_incremental, il, "aggregate incremental loss")?;
        total_ead = checked_add(total_ead, loan.ead, "total EAD")?;

        loan_losses.push(LoanLoss {
            loan_id: loan.id.clone(),
            sector: loan.sector.clone(),
            country: loan.country.clone(),
            region: loan.region.clone(),
            ead: loan.ead,
            pd_base: loan.pd0,
            pd_stressed: stressed.stressed_pd,
            delta_pd: stressed.delta_pd(),
            lgd_base: loan.lgd0,
            lgd_stressed: stressed.stressed_lgd,
            pd_multiplier: resolved.factor.pd_multiplier,
            lgd_multiplier: resolved.factor.lgd_multiplier,
            shock_source: resolved.source,
            expected_loss: el,
            incremental_loss: il,
        });
    }

    if !fallback_sectors.is_empty() {
        tracing::warn!(
            scenario = %scenario.name,
            sectors = ?fallback_sectors,
            "neutral shock applied to sectors without a scenario entry"
        );
    }
    tracing::debug!(
        scenario = %scenario.name,
        loans = loan_losses.len(),
        aggregate_loss = %aggregate_loss,
        "scenario losses computed"
    );

    Ok(LossDistribution {
        scenario: scenario.name.clone(),
        loan_losses,
        aggregate_loss,
        incremental_loss: total_incremental,
        total_ead,
        fallback_sectors: fallback_sectors.into_iter().collect(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

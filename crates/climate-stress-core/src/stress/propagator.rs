use rust_decimal::Decimal;

use crate::error::ClimateStressError;
use crate::numeric::{checked_mul, clamp};
use crate::portfolio::loan::Loan;
use crate::scenarios::registry::ShockFactor;
use crate::types::Rate;
use crate::ClimateStressResult;

/// A loan under one scenario's shock. Borrowed from the portfolio and consumed
/// by the loss engine within the same scenario run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StressedLoan<'a> {
    pub loan: &'a Loan,
    pub shock: ShockFactor,
    /// clamp(PD₀ × pd_multiplier, 0, pd_cap)
    pub stressed_pd: Rate,
    /// clamp(LGD₀ × lgd_multiplier, 0, 1)
    pub stressed_lgd: Rate,
}

impl StressedLoan<'_> {
    /// Climate-driven PD increase, floored at zero.
    pub fn delta_pd(&self) -> Rate {
        (self.stressed_pd - self.loan.pd0).max(Decimal::ZERO)
    }
}

/// Apply a shock with stressed PD capped at 1.
pub fn apply<'a>(loan: &'a Loan, shock: &ShockFactor) -> ClimateStressResult<StressedLoan<'a>> {
    apply_with_cap(loan, shock, Decimal::ONE)
}

/// Apply a shock with stressed PD capped at `pd_cap` (0 < pd_cap ≤ 1).
/// Multiplicative shocks can push either parameter past 1; both results are
/// clamped so they stay valid probabilities and ratios.
pub fn apply_with_cap<'a>(
    loan: &'a Loan,
    shock: &ShockFactor,
    pd_cap: Rate,
) -> ClimateStressResult<StressedLoan<'a>> {
    if pd_cap <= Decimal::ZERO || pd_cap > Decimal::ONE {
        return Err(ClimateStressError::validation("pd_cap", "must be in (0, 1]"));
    }

    let raw_pd = checked_mul(loan.pd0, shock.pd_multiplier, "stressed PD")?;
    let raw_lgd = checked_mul(loan.lgd0, shock.lgd_multiplier, "stressed LGD")?;

    Ok(StressedLoan {
        loan,
        shock: *shock,
        stressed_pd: clamp(raw_pd, Decimal::ZERO, pd_cap),
        stressed_lgd: clamp(raw_lgd, Decimal::ZERO, Decimal::ONE),
    })
}

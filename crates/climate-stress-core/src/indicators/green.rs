use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::numeric::{checked_div, checked_sum};
use crate::portfolio::loan::{Loan, Portfolio};
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::ClimateStressResult;

/// Sector substring (case-insensitive) marking green financing.
pub const GREEN_SECTOR_KEYWORD: &str = "renewable";

/// Maturity above which a loan is counted as green-bond-like (years).
pub const GREEN_BOND_MIN_MATURITY: Decimal = dec!(10);

/// Baseline PD below which a client is counted as target-aligned.
pub const SBTI_PD_THRESHOLD: Rate = dec!(0.02);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreenIndicators {
    pub green_financing_share: Rate,
    pub green_bond_share: Rate,
    pub sbti_client_share: Rate,
    pub loan_count: usize,
    pub total_ead: Money,
}

fn ead_share<F>(portfolio: &Portfolio, predicate: F, context: &str) -> ClimateStressResult<Rate>
where
    F: Fn(&Loan) -> bool,
{
    let total = portfolio.total_ead()?;
    if total.is_zero() {
        return Ok(Decimal::ZERO);
    }
    let matching = checked_sum(
        portfolio.loans().iter().filter(|l| predicate(l)).map(|l| l.ead),
        context,
    )?;
    checked_div(matching, total, context)
}

/// EAD share of loans whose sector mentions "renewable". 0 when the portfolio
/// carries no exposure.
pub fn green_financing_share(portfolio: &Portfolio) -> ClimateStressResult<Rate> {
    ead_share(
        portfolio,
        |l| l.sector.to_lowercase().contains(GREEN_SECTOR_KEYWORD),
        "green financing share",
    )
}

/// EAD share of loans maturing in more than ten years. Loans without a
/// maturity do not count.
pub fn green_bond_share(portfolio: &Portfolio) -> ClimateStressResult<Rate> {
    ead_share(
        portfolio,
        |l| l.maturity_years.is_some_and(|m| m > GREEN_BOND_MIN_MATURITY),
        "green bond share",
    )
}

/// Share of loans (by count) with baseline PD below 2%.
pub fn sbti_client_share(portfolio: &Portfolio) -> ClimateStressResult<Rate> {
    if portfolio.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let aligned = portfolio
        .loans()
        .iter()
        .filter(|l| l.pd0 < SBTI_PD_THRESHOLD)
        .count();
    checked_div(
        Decimal::from(aligned as u64),
        Decimal::from(portfolio.len() as u64),
        "SBTi client share",
    )
}

pub fn calculate_green_indicators(
    portfolio: &Portfolio,
) -> ClimateStressResult<ComputationOutput<GreenIndicators>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let missing_maturity = portfolio
        .loans()
        .iter()
        .filter(|l| l.maturity_years.is_none())
        .count();
    if missing_maturity > 0 {
        warnings.push(format!(
            "{} loan(s) have no maturity_years and are excluded from the green bond share",
            missing_maturity
        ));
    }
    if portfolio.is_empty() {
        warnings.push("Portfolio is empty; all indicators are zero.".into());
    }

    let result = GreenIndicators {
        green_financing_share: green_financing_share(portfolio)?,
        green_bond_share: green_bond_share(portfolio)?,
        sbti_client_share: sbti_client_share(portfolio)?,
        loan_count: portfolio.len(),
        total_ead: portfolio.total_ead()?,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Green portfolio indicators (proxy definitions)",
        &serde_json::json!({
            "green_financing": format!("sector contains '{}'", GREEN_SECTOR_KEYWORD),
            "green_bond": format!("maturity_years > {}", GREEN_BOND_MIN_MATURITY),
            "sbti_aligned": format!("pd0 < {}", SBTI_PD_THRESHOLD),
        }),
        warnings,
        elapsed,
        result,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::loan::LoanRow;

    fn row(id: &str, sector: &str, ead: Decimal, pd0: Decimal, maturity: Option<Decimal>) -> LoanRow {
        LoanRow {
            loan_id: id.into(),
            sector: sector.into(),
            country: None,
            region: None,
            ead,
            pd0,
            lgd0: dec!(0.45),
            maturity_years: maturity,
        }
    }

    fn sample() -> Portfolio {
        Portfolio::load(vec![
            row("L1", "Renewable Energy", dec!(3000), dec!(0.01), Some(dec!(15))),
            row("L2", "Oil & Gas", dec!(5000), dec!(0.03), Some(dec!(5))),
            row("L3", "renewables-wind", dec!(2000), dec!(0.015), None),
        ])
        .unwrap()
    }

    #[test]
    fn test_green_financing_share_case_insensitive() {
        assert_eq!(green_financing_share(&sample()).unwrap(), dec!(0.5));
    }

    #[test]
    fn test_green_bond_share() {
        assert_eq!(green_bond_share(&sample()).unwrap(), dec!(0.3));
    }

    #[test]
    fn test_maturity_exactly_ten_not_counted() {
        let p = Portfolio::load(vec![row("L1", "Energy", dec!(100), dec!(0.01), Some(dec!(10)))])
            .unwrap();
        assert_eq!(green_bond_share(&p).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_sbti_client_share() {
        let share = sbti_client_share(&sample()).unwrap();
        assert_eq!(share.round_dp(6), dec!(0.666667));
    }

    #[test]
    fn test_zero_denominators() {
        let empty = Portfolio::load(Vec::<LoanRow>::new()).unwrap();
        assert_eq!(green_financing_share(&empty).unwrap(), Decimal::ZERO);
        assert_eq!(green_bond_share(&empty).unwrap(), Decimal::ZERO);
        assert_eq!(sbti_client_share(&empty).unwrap(), Decimal::ZERO);

        let zero_ead = Portfolio::load(vec![row("L1", "Renewable", Decimal::ZERO, dec!(0.01), None)])
            .unwrap();
        assert_eq!(green_financing_share(&zero_ead).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_envelope_warns_on_missing_maturity() {
        let out = calculate_green_indicators(&sample()).unwrap();
        assert_eq!(out.result.loan_count, 3);
        assert_eq!(out.result.total_ead, dec!(10000));
        assert!(out.warnings.iter().any(|w| w.contains("maturity_years")));
    }
}

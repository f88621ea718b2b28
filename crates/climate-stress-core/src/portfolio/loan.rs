use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::error::ClimateStressError;
use crate::numeric::checked_sum;
use crate::types::{Money, Rate};
use crate::ClimateStressResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A raw portfolio row as supplied by the I/O layer, before validation.
///
/// The aliases accept the column names of the spreadsheet layout
/// (`EAD_EUR`, `PD_base`, `LGD`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanRow {
    pub loan_id: String,
    pub sector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Exposure at default
    #[serde(alias = "EAD_EUR", alias = "EAD")]
    pub ead: Money,
    /// Baseline annual probability of default (0 to 1)
    #[serde(alias = "PD_base", alias = "PD0")]
    pub pd0: Rate,
    /// Baseline loss given default (0 to 1)
    #[serde(alias = "LGD", alias = "LGD0")]
    pub lgd0: Rate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maturity_years: Option<Decimal>,
}

/// A validated loan exposure. Only produced by [`Portfolio::load`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: String,
    pub sector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub ead: Money,
    pub pd0: Rate,
    pub lgd0: Rate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maturity_years: Option<Decimal>,
}

/// Ordered, validated collection of loans. Loan order is the input order and
/// is preserved through every downstream result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Portfolio {
    loans: Vec<Loan>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Portfolio {
    /// Validate raw rows into a portfolio. Fails on the first row with a
    /// negative EAD, a PD₀ or LGD₀ outside [0, 1], an empty sector or loan id,
    /// a negative maturity, or a loan id already seen.
    pub fn load<I>(rows: I) -> ClimateStressResult<Portfolio>
    where
        I: IntoIterator<Item = LoanRow>,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut loans = Vec::new();

        for (i, row) in rows.into_iter().enumerate() {
            let loan = validate_row(i, row)?;
            if !seen.insert(loan.id.clone()) {
                return Err(ClimateStressError::validation(
                    format!("loans[{}].loan_id", i),
                    format!("duplicate loan identifier '{}'", loan.id),
                ));
            }
            loans.push(loan);
        }

        tracing::debug!(loans = loans.len(), "portfolio loaded");
        Ok(Portfolio { loans })
    }

    pub fn loans(&self) -> &[Loan] {
        &self.loans
    }

    pub fn len(&self) -> usize {
        self.loans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loans.is_empty()
    }

    pub fn total_ead(&self) -> ClimateStressResult<Money> {
        checked_sum(self.loans.iter().map(|l| l.ead), "total EAD")
    }

    /// Distinct sectors, sorted.
    pub fn sectors(&self) -> BTreeSet<&str> {
        self.loans.iter().map(|l| l.sector.as_str()).collect()
    }
}

fn validate_row(i: usize, row: LoanRow) -> ClimateStressResult<Loan> {
    let id = row.loan_id.trim().to_string();
    if id.is_empty() {
        return Err(ClimateStressError::validation(
            format!("loans[{}].loan_id", i),
            "must not be empty",
        ));
    }
    let sector = row.sector.trim().to_string();
    if sector.is_empty() {
        return Err(ClimateStressError::validation(
            format!("loans[{}].sector", i),
            format!("loan '{}' has no sector", id),
        ));
    }
    if row.ead < Decimal::ZERO {
        return Err(ClimateStressError::validation(
            format!("loans[{}].ead", i),
            format!("loan '{}' has negative exposure {}", id, row.ead),
        ));
    }
    if row.pd0 < Decimal::ZERO || row.pd0 > Decimal::ONE {
        return Err(ClimateStressError::validation(
            format!("loans[{}].pd0", i),
            format!("loan '{}' PD {} must be in [0, 1]", id, row.pd0),
        ));
    }
    if row.lgd0 < Decimal::ZERO || row.lgd0 > Decimal::ONE {
        return Err(ClimateStressError::validation(
            format!("loans[{}].lgd0", i),
            format!("loan '{}' LGD {} must be in [0, 1]", id, row.lgd0),
        ));
    }
    if let Some(m) = row.maturity_years {
        if m < Decimal::ZERO {
            return Err(ClimateStressError::validation(
                format!("loans[{}].maturity_years", i),
                format!("loan '{}' has negative maturity {}", id, m),
            ));
        }
    }

    Ok(Loan {
        id,
        sector,
        country: non_empty(row.country),
        region: non_empty(row.region),
        ead: row.ead,
        pd0: row.pd0,
        lgd0: row.lgd0,
        maturity_years: row.maturity_years,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use rust_decimal_macros::dec;

    fn row(id: &str, sector: &str, ead: Decimal, pd0: Decimal, lgd0: Decimal) -> LoanRow {
        LoanRow {
            loan_id: id.into(),
            sector: sector.into(),
            country: None,
            region: None,
            ead,
            pd0,
            lgd0,
            maturity_years: None,
        }
    }

    fn assert_validation_on(result: ClimateStressResult<Portfolio>, field: &str) {
        match result {
            Err(ClimateStressError::Validation { field: f, .. }) => {
                assert_eq!(f, field);
            }
            other => panic!("expected validation error on {field}, got {other:?}"),
        }
    }

    #[test]
    fn test_load_valid_rows() {
        let p = Portfolio::load(vec![
            row("L1", "Energy", dec!(1000), dec!(0.02), dec!(0.4)),
            row("L2", "Transport", dec!(500), dec!(0.05), dec!(0.3)),
        ])
        .unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p.loans()[0].id, "L1");
        assert_eq!(p.loans()[1].id, "L2");
        assert_eq!(p.total_ead().unwrap(), dec!(1500));
    }

    #[test]
    fn test_load_empty() {
        let p = Portfolio::load(Vec::new()).unwrap();
        assert!(p.is_empty());
        assert_eq!(p.total_ead().unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_negative_ead() {
        let r = Portfolio::load(vec![row("L1", "Energy", dec!(-1), dec!(0.02), dec!(0.4))]);
        assert_validation_on(r, "loans[0].ead");
    }

    #[test]
    fn test_zero_ead_allowed() {
        let p = Portfolio::load(vec![row("L1", "Energy", Decimal::ZERO, dec!(0.02), dec!(0.4))]);
        assert!(p.is_ok());
    }

    #[test]
    fn test_pd_above_one() {
        let r = Portfolio::load(vec![row("L1", "Energy", dec!(1), dec!(1.01), dec!(0.4))]);
        assert_validation_on(r, "loans[0].pd0");
    }

    #[test]
    fn test_pd_negative() {
        let r = Portfolio::load(vec![row("L1", "Energy", dec!(1), dec!(-0.01), dec!(0.4))]);
        assert_validation_on(r, "loans[0].pd0");
    }

    #[test]
    fn test_lgd_out_of_range() {
        let r = Portfolio::load(vec![row("L1", "Energy", dec!(1), dec!(0.01), dec!(1.5))]);
        assert_validation_on(r, "loans[0].lgd0");
    }

    #[test]
    fn test_boundary_probabilities_allowed() {
        let p = Portfolio::load(vec![
            row("L1", "Energy", dec!(1), Decimal::ZERO, Decimal::ONE),
            row("L2", "Energy", dec!(1), Decimal::ONE, Decimal::ZERO),
        ]);
        assert!(p.is_ok());
    }

    #[test]
    fn test_empty_sector() {
        let r = Portfolio::load(vec![row("L1", "  ", dec!(1), dec!(0.01), dec!(0.4))]);
        assert_validation_on(r, "loans[0].sector");
    }

    #[test]
    fn test_empty_loan_id() {
        let r = Portfolio::load(vec![row("", "Energy", dec!(1), dec!(0.01), dec!(0.4))]);
        assert_validation_on(r, "loans[0].loan_id");
    }

    #[test]
    fn test_duplicate_id() {
        let r = Portfolio::load(vec![
            row("L1", "Energy", dec!(1), dec!(0.01), dec!(0.4)),
            row("L2", "Energy", dec!(1), dec!(0.01), dec!(0.4)),
            row("L1", "Transport", dec!(1), dec!(0.01), dec!(0.4)),
        ]);
        assert_validation_on(r, "loans[2].loan_id");
    }

    #[test]
    fn test_negative_maturity() {
        let mut r = row("L1", "Energy", dec!(1), dec!(0.01), dec!(0.4));
        r.maturity_years = Some(dec!(-2));
        let err = Portfolio::load(vec![r]).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_blank_country_becomes_none() {
        let mut r = row("L1", "Energy", dec!(1), dec!(0.01), dec!(0.4));
        r.country = Some(" ".into());
        r.region = Some("Europe".into());
        let p = Portfolio::load(vec![r]).unwrap();
        assert_eq!(p.loans()[0].country, None);
        assert_eq!(p.loans()[0].region.as_deref(), Some("Europe"));
    }

    #[test]
    fn test_sectors_sorted_distinct() {
        let p = Portfolio::load(vec![
            row("L1", "Transport", dec!(1), dec!(0.01), dec!(0.4)),
            row("L2", "Energy", dec!(1), dec!(0.01), dec!(0.4)),
            row("L3", "Energy", dec!(1), dec!(0.01), dec!(0.4)),
        ])
        .unwrap();
        let sectors: Vec<&str> = p.sectors().into_iter().collect();
        assert_eq!(sectors, vec!["Energy", "Transport"]);
    }

    #[test]
    fn test_deserialize_spreadsheet_column_names() {
        let r: LoanRow = serde_json::from_str(
            r#"{"loan_id":"L9","sector":"Agriculture","EAD_EUR":"2500","PD_base":"0.03","LGD":"0.45"}"#,
        )
        .unwrap();
        assert_eq!(r.ead, dec!(2500));
        assert_eq!(r.pd0, dec!(0.03));
        assert_eq!(r.lgd0, dec!(0.45));
    }
}

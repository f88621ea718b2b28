use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::loss::engine::LoanLoss;
use crate::numeric::{checked_add, checked_div};
use crate::types::{Money, Rate};
use crate::ClimateStressResult;

/// Group key used for loans without a country or region.
pub const UNKNOWN_GROUP: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Sector,
    Country,
    Region,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::Sector, Dimension::Country, Dimension::Region];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Sector => "sector",
            Dimension::Country => "country",
            Dimension::Region => "region",
        }
    }

    fn key<'a>(&self, loss: &'a LoanLoss) -> &'a str {
        match self {
            Dimension::Sector => &loss.sector,
            Dimension::Country => loss.country.as_deref().unwrap_or(UNKNOWN_GROUP),
            Dimension::Region => loss.region.as_deref().unwrap_or(UNKNOWN_GROUP),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownRow {
    pub key: String,
    pub n_loans: usize,
    pub ead: Money,
    pub expected_loss: Money,
    pub incremental_loss: Money,
    pub avg_pd_base: Rate,
    pub avg_pd_stressed: Rate,
    pub avg_lgd_base: Rate,
    pub avg_lgd_stressed: Rate,
    /// expected_loss / ead, 0 when the group has no exposure
    pub loss_rate_on_ead: Rate,
}

#[derive(Default)]
struct Accumulator {
    n: usize,
    ead: Decimal,
    el: Decimal,
    il: Decimal,
    pd_base: Decimal,
    pd_stressed: Decimal,
    lgd_base: Decimal,
    lgd_stressed: Decimal,
}

impl Accumulator {
    fn add(&mut self, l: &LoanLoss) -> ClimateStressResult<()> {
        self.n += 1;
        self.ead = checked_add(self.ead, l.ead, "breakdown EAD")?;
        self.el = checked_add(self.el, l.expected_loss, "breakdown expected loss")?;
        self.il = checked_add(self.il, l.incremental_loss, "breakdown incremental loss")?;
        self.pd_base = checked_add(self.pd_base, l.pd_base, "breakdown PD")?;
        self.pd_stressed = checked_add(self.pd_stressed, l.pd_stressed, "breakdown PD")?;
        self.lgd_base = checked_add(self.lgd_base, l.lgd_base, "breakdown LGD")?;
        self.lgd_stressed = checked_add(self.lgd_stressed, l.lgd_stressed, "breakdown LGD")?;
        Ok(())
    }

    fn finish(self, key: String) -> ClimateStressResult<BreakdownRow> {
        let n = Decimal::from(self.n as u64);
        let loss_rate_on_ead = if self.ead > Decimal::ZERO {
            checked_div(self.el, self.ead, "loss rate on EAD")?
        } else {
            Decimal::ZERO
        };
        Ok(BreakdownRow {
            key,
            n_loans: self.n,
            ead: self.ead,
            expected_loss: self.el,
            incremental_loss: self.il,
            avg_pd_base: checked_div(self.pd_base, n, "average PD")?,
            avg_pd_stressed: checked_div(self.pd_stressed, n, "average PD")?,
            avg_lgd_base: checked_div(self.lgd_base, n, "average LGD")?,
            avg_lgd_stressed: checked_div(self.lgd_stressed, n, "average LGD")?,
            loss_rate_on_ead,
        })
    }
}

/// Aggregate per-loan results by sector, country or region, largest expected
/// loss first (ties by key).
pub fn summarize(losses: &[LoanLoss], dimension: Dimension) -> ClimateStressResult<Vec<BreakdownRow>> {
    let mut groups: BTreeMap<&str, Accumulator> = BTreeMap::new();
    for l in losses {
        groups.entry(dimension.key(l)).or_default().add(l)?;
    }

    let mut rows = groups
        .into_iter()
        .map(|(key, acc)| acc.finish(key.to_string()))
        .collect::<ClimateStressResult<Vec<_>>>()?;
    rows.sort_by(|a, b| {
        b.expected_loss
            .cmp(&a.expected_loss)
            .then_with(|| a.key.cmp(&b.key))
    });
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::registry::ShockSource;
    use rust_decimal_macros::dec;

    fn loss(
        id: &str,
        sector: &str,
        country: Option<&str>,
        ead: Decimal,
        pd: Decimal,
        el: Decimal,
    ) -> LoanLoss {
        LoanLoss {
            loan_id: id.into(),
            sector: sector.into(),
            country: country.map(String::from),
            region: None,
            ead,
            pd_base: pd,
            pd_stressed: pd * dec!(2),
            delta_pd: pd,
            lgd_base: dec!(0.4),
            lgd_stressed: dec!(0.5),
            pd_multiplier: dec!(2),
            lgd_multiplier: dec!(1.25),
            shock_source: ShockSource::Scenario,
            expected_loss: el,
            incremental_loss: el / dec!(2),
        }
    }

    fn sample() -> Vec<LoanLoss> {
        vec![
            loss("L1", "Energy", Some("FR"), dec!(1000), dec!(0.02), dec!(20)),
            loss("L2", "Transport", Some("DE"), dec!(2000), dec!(0.01), dec!(20)),
            loss("L3", "Energy", None, dec!(1000), dec!(0.04), dec!(40)),
        ]
    }

    #[test]
    fn test_by_sector() {
        let rows = summarize(&sample(), Dimension::Sector).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, "Energy");
        assert_eq!(rows[0].n_loans, 2);
        assert_eq!(rows[0].ead, dec!(2000));
        assert_eq!(rows[0].expected_loss, dec!(60));
        assert_eq!(rows[0].incremental_loss, dec!(30));
        assert_eq!(rows[0].avg_pd_base, dec!(0.03));
        assert_eq!(rows[0].avg_pd_stressed, dec!(0.06));
        assert_eq!(rows[0].loss_rate_on_ead, dec!(0.03));
        assert_eq!(rows[1].key, "Transport");
        assert_eq!(rows[1].loss_rate_on_ead, dec!(0.01));
    }

    #[test]
    fn test_by_country_unknown_group_and_tie_order() {
        let rows = summarize(&sample(), Dimension::Country).unwrap();
        let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
        // unknown has 40; DE and FR tie on 20 and sort by key
        assert_eq!(keys, vec![UNKNOWN_GROUP, "DE", "FR"]);
    }

    #[test]
    fn test_zero_ead_loss_rate() {
        let rows = summarize(
            &[loss("L1", "Energy", None, Decimal::ZERO, dec!(0.02), Decimal::ZERO)],
            Dimension::Sector,
        )
        .unwrap();
        assert_eq!(rows[0].loss_rate_on_ead, Decimal::ZERO);
    }

    #[test]
    fn test_empty() {
        assert!(summarize(&[], Dimension::Region).unwrap().is_empty());
    }
}

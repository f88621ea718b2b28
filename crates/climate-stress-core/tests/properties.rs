use climate_stress_core::config::MissingShockPolicy;
use climate_stress_core::loss::engine::{expected_loss, portfolio_loss};
use climate_stress_core::portfolio::loan::{LoanRow, Portfolio};
use climate_stress_core::scenarios::registry::{Scenario, ScenarioRegistry, ShockFactor};
use climate_stress_core::stress::propagator::apply;
use climate_stress_core::var::climate_var::nearest_rank_quantile;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

// Decimals with four fractional digits, built from integer mantissas
fn unit_interval() -> impl Strategy<Value = Decimal> {
    (0i64..=10_000).prop_map(|m| Decimal::new(m, 4))
}

fn multiplier() -> impl Strategy<Value = Decimal> {
    (0i64..=1_000_000).prop_map(|m| Decimal::new(m, 4))
}

fn exposure() -> impl Strategy<Value = Decimal> {
    (0i64..=1_000_000_000).prop_map(|m| Decimal::new(m, 2))
}

fn one_loan(ead: Decimal, pd0: Decimal, lgd0: Decimal) -> Portfolio {
    Portfolio::load(vec![LoanRow {
        loan_id: "L1".into(),
        sector: "Energy".into(),
        country: None,
        region: None,
        ead,
        pd0,
        lgd0,
        maturity_years: None,
    }])
    .unwrap()
}

fn energy_scenario(shock: ShockFactor) -> Scenario {
    let mut shocks = BTreeMap::new();
    shocks.insert("Energy".to_string(), shock);
    Scenario::new("prop", shocks).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn stressed_parameters_stay_in_unit_interval(
        pd0 in unit_interval(),
        lgd0 in unit_interval(),
        pd_m in multiplier(),
        lgd_m in multiplier(),
    ) {
        let p = one_loan(Decimal::ONE_THOUSAND, pd0, lgd0);
        let s = apply(&p.loans()[0], &ShockFactor::new(pd_m, lgd_m).unwrap()).unwrap();
        prop_assert!(s.stressed_pd >= Decimal::ZERO && s.stressed_pd <= Decimal::ONE);
        prop_assert!(s.stressed_lgd >= Decimal::ZERO && s.stressed_lgd <= Decimal::ONE);
    }

    #[test]
    fn neutral_shock_is_identity(pd0 in unit_interval(), lgd0 in unit_interval()) {
        let p = one_loan(Decimal::ONE_HUNDRED, pd0, lgd0);
        let s = apply(&p.loans()[0], &ShockFactor::neutral()).unwrap();
        prop_assert_eq!(s.stressed_pd, pd0);
        prop_assert_eq!(s.stressed_lgd, lgd0);
    }

    #[test]
    fn expected_loss_monotone_in_multipliers(
        ead in exposure(),
        pd0 in unit_interval(),
        lgd0 in unit_interval(),
        a in multiplier(),
        b in multiplier(),
        fixed in multiplier(),
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let p = one_loan(ead, pd0, lgd0);
        let loan = &p.loans()[0];

        let el = |pd_m, lgd_m| {
            let s = apply(loan, &ShockFactor::new(pd_m, lgd_m).unwrap()).unwrap();
            expected_loss(&s).unwrap()
        };
        prop_assert!(el(lo, fixed) <= el(hi, fixed));
        prop_assert!(el(fixed, lo) <= el(fixed, hi));
    }

    #[test]
    fn quantile_is_a_member_within_bounds(
        values in prop::collection::vec(exposure(), 1..60),
        alpha_bp in 1i64..10_000,
    ) {
        let alpha = Decimal::new(alpha_bp, 4);
        let q = nearest_rank_quantile(&values, alpha).unwrap().unwrap();
        let min = values.iter().copied().min().unwrap();
        let max = values.iter().copied().max().unwrap();
        prop_assert!(values.contains(&q));
        prop_assert!(q >= min && q <= max);
    }

    #[test]
    fn quantile_non_decreasing_in_alpha(
        values in prop::collection::vec(exposure(), 1..60),
        a in 1i64..10_000,
        b in 1i64..10_000,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let q_lo = nearest_rank_quantile(&values, Decimal::new(lo, 4)).unwrap().unwrap();
        let q_hi = nearest_rank_quantile(&values, Decimal::new(hi, 4)).unwrap().unwrap();
        prop_assert!(q_lo <= q_hi);
    }

    #[test]
    fn portfolio_loss_is_deterministic(
        ead in exposure(),
        pd0 in unit_interval(),
        lgd0 in unit_interval(),
        pd_m in multiplier(),
        lgd_m in multiplier(),
    ) {
        let p = one_loan(ead, pd0, lgd0);
        let sc = energy_scenario(ShockFactor::new(pd_m, lgd_m).unwrap());
        let registry = ScenarioRegistry::new(MissingShockPolicy::Raise);
        let a = portfolio_loss(&p, &registry, &sc, Decimal::ONE).unwrap();
        let b = portfolio_loss(&p, &registry, &sc, Decimal::ONE).unwrap();
        prop_assert_eq!(a, b);
    }
}

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ClimateStressError;
use crate::types::Rate;
use crate::ClimateStressResult;

/// What to do when a scenario has no shock for a sector held in the portfolio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingShockPolicy {
    /// Fail the scenario with `MissingSectorShock`.
    #[default]
    Raise,
    /// Apply the neutral shock (1.0, 1.0) and record a warning.
    Neutral,
}

/// How a Climate VaR figure was derived. The methods are not numerically
/// comparable, so every result carries the one it used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarMethod {
    /// Nearest-rank quantile of the per-loan expected losses.
    #[default]
    LoanQuantile,
    /// Empirical quantile of simulated aggregate losses (Bernoulli defaults
    /// at stressed PD, LGD held at its stressed value).
    Simulated,
    /// Nearest-rank quantile of aggregate expected losses across scenarios.
    CrossScenario,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationSettings {
    #[serde(default = "default_num_simulations")]
    pub num_simulations: u32,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        SimulationSettings {
            num_simulations: default_num_simulations(),
            seed: default_seed(),
        }
    }
}

fn default_num_simulations() -> u32 {
    10_000
}

fn default_seed() -> u64 {
    42
}

/// Read-only run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressTestConfig {
    /// VaR confidence level α, e.g. 0.95
    #[serde(default = "default_confidence_level")]
    pub confidence_level: Rate,
    #[serde(default)]
    pub missing_shock_policy: MissingShockPolicy,
    /// Upper bound for stressed PD (stressed LGD is always capped at 1)
    #[serde(default = "default_pd_cap")]
    pub pd_cap: Rate,
    #[serde(default)]
    pub var_method: VarMethod,
    #[serde(default)]
    pub simulation: SimulationSettings,
    /// Scenarios to run; all registered scenarios when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenarios: Option<Vec<String>>,
}

impl Default for StressTestConfig {
    fn default() -> Self {
        StressTestConfig {
            confidence_level: default_confidence_level(),
            missing_shock_policy: MissingShockPolicy::default(),
            pd_cap: default_pd_cap(),
            var_method: VarMethod::default(),
            simulation: SimulationSettings::default(),
            scenarios: None,
        }
    }
}

fn default_confidence_level() -> Rate {
    dec!(0.95)
}

fn default_pd_cap() -> Rate {
    Decimal::ONE
}

impl StressTestConfig {
    /// Checks that do not depend on the portfolio or scenarios. An invalid
    /// confidence level is not rejected here; it fails each scenario's VaR
    /// step instead of the whole run.
    pub fn validate(&self) -> ClimateStressResult<()> {
        if self.pd_cap <= Decimal::ZERO || self.pd_cap > Decimal::ONE {
            return Err(ClimateStressError::validation(
                "pd_cap",
                "must be in (0, 1]",
            ));
        }
        if self.var_method == VarMethod::CrossScenario {
            return Err(ClimateStressError::validation(
                "var_method",
                "cross_scenario is reported for every run; choose loan_quantile or simulated",
            ));
        }
        if self.var_method == VarMethod::Simulated {
            if self.simulation.num_simulations == 0 {
                return Err(ClimateStressError::validation(
                    "simulation.num_simulations",
                    "must be at least 1",
                ));
            }
            if cfg!(not(feature = "stochastic")) {
                return Err(ClimateStressError::validation(
                    "var_method",
                    "simulated VaR requires the `stochastic` feature",
                ));
            }
        }
        if let Some(names) = &self.scenarios {
            if names.is_empty() {
                return Err(ClimateStressError::validation(
                    "scenarios",
                    "an explicit scenario selection must name at least one scenario",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = StressTestConfig::default();
        assert_eq!(cfg.confidence_level, dec!(0.95));
        assert_eq!(cfg.pd_cap, Decimal::ONE);
        assert_eq!(cfg.missing_shock_policy, MissingShockPolicy::Raise);
        assert_eq!(cfg.var_method, VarMethod::LoanQuantile);
        assert_eq!(cfg.simulation.num_simulations, 10_000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_deserialize_empty_object_uses_defaults() {
        let cfg: StressTestConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, StressTestConfig::default());
    }

    #[test]
    fn test_deserialize_overrides() {
        let cfg: StressTestConfig = serde_json::from_str(
            r#"{
                "confidence_level": "0.99",
                "missing_shock_policy": "neutral",
                "var_method": "simulated",
                "simulation": { "num_simulations": 500 }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.confidence_level, dec!(0.99));
        assert_eq!(cfg.missing_shock_policy, MissingShockPolicy::Neutral);
        assert_eq!(cfg.var_method, VarMethod::Simulated);
        assert_eq!(cfg.simulation.num_simulations, 500);
        assert_eq!(cfg.simulation.seed, 42);
    }

    #[test]
    fn test_pd_cap_out_of_range() {
        let cfg = StressTestConfig {
            pd_cap: dec!(1.1),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = StressTestConfig {
            pd_cap: Decimal::ZERO,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_simulations_rejected() {
        let cfg = StressTestConfig {
            var_method: VarMethod::Simulated,
            simulation: SimulationSettings {
                num_simulations: 0,
                seed: 1,
            },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_cross_scenario_not_selectable() {
        let cfg = StressTestConfig {
            var_method: VarMethod::CrossScenario,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_invalid_alpha_not_rejected_by_config() {
        let cfg = StressTestConfig {
            confidence_level: dec!(1.5),
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }
}

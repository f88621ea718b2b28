use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::MissingShockPolicy;
use crate::error::ClimateStressError;
use crate::types::Multiplier;
use crate::ClimateStressResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Sector-level shock applied multiplicatively to baseline PD and LGD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShockFactor {
    pub pd_multiplier: Multiplier,
    pub lgd_multiplier: Multiplier,
}

impl ShockFactor {
    pub fn new(pd_multiplier: Multiplier, lgd_multiplier: Multiplier) -> ClimateStressResult<Self> {
        if pd_multiplier < Decimal::ZERO {
            return Err(ClimateStressError::validation(
                "pd_multiplier",
                format!("must be non-negative, got {}", pd_multiplier),
            ));
        }
        if lgd_multiplier < Decimal::ZERO {
            return Err(ClimateStressError::validation(
                "lgd_multiplier",
                format!("must be non-negative, got {}", lgd_multiplier),
            ));
        }
        Ok(ShockFactor {
            pd_multiplier,
            lgd_multiplier,
        })
    }

    /// The identity shock (1.0, 1.0).
    pub fn neutral() -> Self {
        ShockFactor {
            pd_multiplier: Decimal::ONE,
            lgd_multiplier: Decimal::ONE,
        }
    }

    /// Build from relative uplifts: multiplier = 1 + uplift. An uplift of
    /// 0.25 raises the parameter by 25%; uplifts below -1 are rejected.
    pub fn from_uplift(pd_uplift: Decimal, lgd_uplift: Decimal) -> ClimateStressResult<Self> {
        let pd = Decimal::ONE.checked_add(pd_uplift).ok_or_else(|| {
            ClimateStressError::numeric(format!("pd_uplift {} overflows", pd_uplift))
        })?;
        let lgd = Decimal::ONE.checked_add(lgd_uplift).ok_or_else(|| {
            ClimateStressError::numeric(format!("lgd_uplift {} overflows", lgd_uplift))
        })?;
        ShockFactor::new(pd, lgd)
    }

    pub fn is_neutral(&self) -> bool {
        self.pd_multiplier == Decimal::ONE && self.lgd_multiplier == Decimal::ONE
    }
}

/// A shock as written in a scenario file: explicit multipliers, or relative
/// uplifts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShockSpec {
    Multipliers {
        pd_multiplier: Multiplier,
        lgd_multiplier: Multiplier,
    },
    Uplifts {
        pd_uplift: Decimal,
        lgd_uplift: Decimal,
    },
}

impl ShockSpec {
    pub fn to_factor(&self) -> ClimateStressResult<ShockFactor> {
        match self {
            ShockSpec::Multipliers {
                pd_multiplier,
                lgd_multiplier,
            } => ShockFactor::new(*pd_multiplier, *lgd_multiplier),
            ShockSpec::Uplifts {
                pd_uplift,
                lgd_uplift,
            } => ShockFactor::from_uplift(*pd_uplift, *lgd_uplift),
        }
    }
}

/// Scenario as supplied by the I/O layer.
///
/// `shocks` keeps every entry in file order, repeated sectors included, so
/// that [`Scenario::from_definition`] can reject them. `name` may be left out
/// when the scenario is keyed by name in its file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(with = "sector_entries")]
    pub shocks: Vec<(String, ShockSpec)>,
}

/// `sector -> shock` map read into ordered pairs without collapsing
/// repeated keys.
mod sector_entries {
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    use super::ShockSpec;

    pub fn serialize<S: Serializer>(
        entries: &[(String, ShockSpec)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (sector, spec) in entries {
            map.serialize_entry(sector, spec)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(String, ShockSpec)>, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = Vec<(String, ShockSpec)>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of sector to shock")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, ShockSpec>()? {
                    entries.push(entry);
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// A named climate scenario: sector -> shock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    shocks: BTreeMap<String, ShockFactor>,
}

impl Scenario {
    pub fn new(
        name: impl Into<String>,
        shocks: BTreeMap<String, ShockFactor>,
    ) -> ClimateStressResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ClimateStressError::validation(
                "scenario.name",
                "must not be empty",
            ));
        }
        for sector in shocks.keys() {
            if sector.trim().is_empty() {
                return Err(ClimateStressError::validation(
                    format!("scenarios[{}].shocks", name),
                    "sector keys must not be empty",
                ));
            }
        }
        Ok(Scenario {
            name: name.trim().to_string(),
            description: None,
            shocks,
        })
    }

    pub fn from_definition(def: &ScenarioDefinition) -> ClimateStressResult<Self> {
        let mut shocks = BTreeMap::new();
        for (sector, spec) in &def.shocks {
            let factor = spec.to_factor().map_err(|e| match e {
                ClimateStressError::Validation { field, reason } => {
                    ClimateStressError::Validation {
                        field: format!("scenarios[{}].shocks[{}].{}", def.name, sector, field),
                        reason,
                    }
                }
                other => other,
            })?;
            if shocks.insert(sector.trim().to_string(), factor).is_some() {
                return Err(ClimateStressError::validation(
                    format!("scenarios[{}].shocks[{}]", def.name, sector),
                    "sector is listed more than once",
                ));
            }
        }
        let mut scenario = Scenario::new(def.name.clone(), shocks)?;
        scenario.description = def.description.clone();
        Ok(scenario)
    }

    /// The explicit shock for a sector, if the scenario defines one.
    pub fn shock(&self, sector: &str) -> Option<&ShockFactor> {
        self.shocks.get(sector)
    }

    pub fn shocks(&self) -> &BTreeMap<String, ShockFactor> {
        &self.shocks
    }
}

/// Where a resolved shock came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShockSource {
    Scenario,
    NeutralFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedShock {
    pub factor: ShockFactor,
    pub source: ShockSource,
}

/// Look up a sector shock under the given missing-key policy.
fn resolve_shock(
    scenario: &Scenario,
    sector: &str,
    policy: MissingShockPolicy,
) -> ClimateStressResult<ResolvedShock> {
    match (scenario.shock(sector), policy) {
        (Some(factor), _) => Ok(ResolvedShock {
            factor: *factor,
            source: ShockSource::Scenario,
        }),
        (None, MissingShockPolicy::Neutral) => Ok(ResolvedShock {
            factor: ShockFactor::neutral(),
            source: ShockSource::NeutralFallback,
        }),
        (None, MissingShockPolicy::Raise) => Err(ClimateStressError::MissingSectorShock {
            scenario: scenario.name.clone(),
            sector: sector.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Named scenarios, keyed and iterated in name order.
#[derive(Debug, Clone, Default)]
pub struct ScenarioRegistry {
    scenarios: BTreeMap<String, Scenario>,
    missing_shock_policy: MissingShockPolicy,
}

impl ScenarioRegistry {
    pub fn new(missing_shock_policy: MissingShockPolicy) -> Self {
        ScenarioRegistry {
            scenarios: BTreeMap::new(),
            missing_shock_policy,
        }
    }

    /// Build and register every definition, stopping at the first invalid or
    /// duplicate scenario.
    pub fn from_definitions(
        definitions: &[ScenarioDefinition],
        missing_shock_policy: MissingShockPolicy,
    ) -> ClimateStressResult<Self> {
        let mut registry = ScenarioRegistry::new(missing_shock_policy);
        for def in definitions {
            registry.register(Scenario::from_definition(def)?)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, scenario: Scenario) -> ClimateStressResult<()> {
        if self.scenarios.contains_key(&scenario.name) {
            return Err(ClimateStressError::DuplicateScenario(scenario.name));
        }
        tracing::debug!(
            scenario = %scenario.name,
            sectors = scenario.shocks.len(),
            "scenario registered"
        );
        self.scenarios.insert(scenario.name.clone(), scenario);
        Ok(())
    }

    pub fn get(&self, name: &str) -> ClimateStressResult<&Scenario> {
        self.scenarios
            .get(name)
            .ok_or_else(|| ClimateStressError::UnknownScenario(name.to_string()))
    }

    pub fn shock_for(&self, scenario: &Scenario, sector: &str) -> ClimateStressResult<ResolvedShock> {
        resolve_shock(scenario, sector, self.missing_shock_policy)
    }

    pub fn missing_shock_policy(&self) -> MissingShockPolicy {
        self.missing_shock_policy
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scenarios.keys().map(String::as_str)
    }

    pub fn scenarios(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.values()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

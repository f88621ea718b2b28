use serde::de::{DeserializeOwned, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use climate_stress_core::portfolio::loan::LoanRow;
use climate_stress_core::scenarios::registry::{ScenarioDefinition, ShockSpec};
use climate_stress_core::ClimateStressError;
use rust_decimal::Decimal;

type InputResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
    Csv,
}

fn format_of(path: &Path) -> Format {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("yaml") | Some("yml") => Format::Yaml,
        Some("csv") => Format::Csv,
        _ => Format::Json,
    }
}

fn read_text(path: &str) -> InputResult<(PathBuf, String)> {
    let canonical = resolve_path(path)?;
    let contents = fs::read_to_string(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    Ok((canonical, contents))
}

/// Prefix `source` to parse errors. Core errors pass through unchanged so
/// that their category still decides the exit code.
pub(crate) fn with_source(
    source: &str,
    e: Box<dyn std::error::Error>,
) -> Box<dyn std::error::Error> {
    if e.is::<ClimateStressError>() {
        e
    } else {
        format!("Failed to parse {}: {}", source, e).into()
    }
}

/// Read a JSON or YAML file (chosen by extension) into a typed struct.
pub fn read_structured<T: DeserializeOwned>(path: &str) -> InputResult<T> {
    let (canonical, contents) = read_text(path)?;
    let value: T = match format_of(&canonical) {
        Format::Yaml => serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?,
        Format::Json | Format::Csv => serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?,
    };
    Ok(value)
}

fn parse_json(contents: &str) -> InputResult<Value> {
    Ok(serde_json::from_str(contents)?)
}

fn parse_yaml(contents: &str) -> InputResult<Value> {
    Ok(serde_yaml::from_str(contents)?)
}

/// Exact decimal from a text cell; scientific notation is accepted.
fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    if raw.is_empty() {
        return Err("value is missing".into());
    }
    raw.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| format!("invalid number '{}'", raw))
}

// ---------------------------------------------------------------------------
// Portfolio
// ---------------------------------------------------------------------------

/// Read portfolio rows from a CSV or JSON file.
pub fn read_portfolio(path: &str) -> InputResult<Vec<LoanRow>> {
    let (canonical, contents) = read_text(path)?;
    let rows = match format_of(&canonical) {
        Format::Csv => parse_portfolio_csv(&contents),
        Format::Json => parse_json(&contents).and_then(loans_from_value),
        Format::Yaml => parse_yaml(&contents).and_then(loans_from_value),
    };
    rows.map_err(|e| with_source(&format!("'{}'", canonical.display()), e))
}

/// Header names accepted for each portfolio column, canonical name first.
const LOAN_ID: &[&str] = &["loan_id"];
const SECTOR: &[&str] = &["sector"];
const COUNTRY: &[&str] = &["country"];
const REGION: &[&str] = &["region"];
const EAD: &[&str] = &["ead", "EAD_EUR", "EAD"];
const PD0: &[&str] = &["pd0", "PD_base", "PD0"];
const LGD0: &[&str] = &["lgd0", "LGD", "LGD0"];
const MATURITY: &[&str] = &["maturity_years"];

struct PortfolioColumns {
    loan_id: usize,
    sector: usize,
    country: Option<usize>,
    region: Option<usize>,
    ead: usize,
    pd0: usize,
    lgd0: usize,
    maturity_years: Option<usize>,
}

impl PortfolioColumns {
    fn locate(headers: &csv::StringRecord) -> Result<Self, ClimateStressError> {
        let find = |names: &[&str]| headers.iter().position(|h| names.iter().any(|n| *n == h));
        let require = |names: &[&str]| {
            find(names).ok_or_else(|| ClimateStressError::Validation {
                field: format!("loans.{}", names[0]),
                reason: format!("column is missing (accepted headers: {})", names.join(", ")),
            })
        };
        Ok(PortfolioColumns {
            loan_id: require(LOAN_ID)?,
            sector: require(SECTOR)?,
            country: find(COUNTRY),
            region: find(REGION),
            ead: require(EAD)?,
            pd0: require(PD0)?,
            lgd0: require(LGD0)?,
            maturity_years: find(MATURITY),
        })
    }

    fn loan(&self, i: usize, record: &csv::StringRecord) -> Result<LoanRow, ClimateStressError> {
        let cell = |idx: usize| record.get(idx).unwrap_or_default();
        let optional = |idx: Option<usize>| idx.map(cell).filter(|v| !v.is_empty());
        let number = |idx: usize, column: &str| {
            parse_decimal(cell(idx)).map_err(|reason| ClimateStressError::Validation {
                field: format!("loans[{}].{}", i, column),
                reason,
            })
        };

        Ok(LoanRow {
            loan_id: cell(self.loan_id).to_string(),
            sector: cell(self.sector).to_string(),
            country: optional(self.country).map(String::from),
            region: optional(self.region).map(String::from),
            ead: number(self.ead, "ead")?,
            pd0: number(self.pd0, "pd0")?,
            lgd0: number(self.lgd0, "lgd0")?,
            maturity_years: match self.maturity_years.filter(|&idx| !cell(idx).is_empty()) {
                Some(idx) => Some(number(idx, "maturity_years")?),
                None => None,
            },
        })
    }
}

/// Portfolio CSV with a header row. Both `ead,pd0,lgd0` and the
/// spreadsheet names `EAD_EUR,PD_base,LGD` are accepted. Numbers are read
/// from the cell text, so no precision is lost; a missing column or an
/// unparseable cell is a validation error naming `loans[i].<column>`.
pub fn parse_portfolio_csv(contents: &str) -> InputResult<Vec<LoanRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(contents.as_bytes());
    let columns = PortfolioColumns::locate(rdr.headers()?)?;
    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        rows.push(columns.loan(i, &record?)?);
    }
    Ok(rows)
}

/// Accept either a bare array of rows or an object with a `loans` array.
/// A row that does not match the loan layout is a validation error.
pub fn loans_from_value(value: Value) -> InputResult<Vec<LoanRow>> {
    let rows = match value {
        Value::Object(mut map) => match map.remove("loans") {
            Some(Value::Array(rows)) => rows,
            _ => return Err("expected an array of loans or an object with a 'loans' array".into()),
        },
        Value::Array(rows) => rows,
        _ => return Err("expected an array of loans or an object with a 'loans' array".into()),
    };
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| -> InputResult<LoanRow> {
            serde_json::from_value(row).map_err(|e| {
                ClimateStressError::Validation {
                    field: format!("loans[{}]", i),
                    reason: e.to_string(),
                }
                .into()
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

/// Read scenario definitions from JSON/YAML, or from a wide uplift table
/// in CSV (`sector,pd_uplift_<name>,lgd_uplift_<name>,...`).
pub fn read_scenarios(path: &str) -> InputResult<Vec<ScenarioDefinition>> {
    let (canonical, contents) = read_text(path)?;
    let defs = match format_of(&canonical) {
        Format::Csv => parse_uplift_table(&contents),
        Format::Json => parse_scenarios_json(&contents),
        Format::Yaml => parse_scenarios_yaml(&contents),
    };
    defs.map_err(|e| with_source(&format!("'{}'", canonical.display()), e))
}

pub fn parse_scenarios_json(contents: &str) -> InputResult<Vec<ScenarioDefinition>> {
    Ok(serde_json::from_str::<ScenarioFile>(contents)?.0)
}

pub fn parse_scenarios_yaml(contents: &str) -> InputResult<Vec<ScenarioDefinition>> {
    Ok(serde_yaml::from_str::<ScenarioFile>(contents)?.0)
}

/// A list of definitions, an object with a `scenarios` entry, or a map keyed
/// by scenario name. Definitions are read straight from the document so a
/// repeated name or sector survives to registration, where it is rejected.
struct ScenarioFile(Vec<ScenarioDefinition>);

impl<'de> Deserialize<'de> for ScenarioFile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ScenarioFileVisitor)
    }
}

struct ScenarioFileVisitor;

impl<'de> Visitor<'de> for ScenarioFileVisitor {
    type Value = ScenarioFile;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a list or map of scenarios")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut defs = Vec::new();
        while let Some(def) = seq.next_element::<ScenarioDefinition>()? {
            defs.push(def);
        }
        Ok(ScenarioFile(defs))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut defs = Vec::new();
        while let Some(key) = map.next_key::<String>()? {
            if key == "scenarios" {
                defs.extend(map.next_value::<ScenarioFile>()?.0);
            } else {
                let mut def = map.next_value::<ScenarioDefinition>()?;
                def.name = key;
                defs.push(def);
            }
        }
        Ok(ScenarioFile(defs))
    }
}

/// Parse the spreadsheet layout: one row per sector, one `pd_uplift_<name>`
/// and one `lgd_uplift_<name>` column per scenario.
pub fn parse_uplift_table(contents: &str) -> InputResult<Vec<ScenarioDefinition>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(contents.as_bytes());
    let headers = rdr.headers()?.clone();

    let sector_col = headers
        .iter()
        .position(|h| h == "sector")
        .ok_or("uplift table has no 'sector' column")?;

    let mut names: Vec<String> = Vec::new();
    for h in headers.iter() {
        if let Some(name) = h.strip_prefix("pd_uplift_") {
            if !headers.iter().any(|o| o == format!("lgd_uplift_{}", name)) {
                return Err(format!("column 'lgd_uplift_{}' is missing", name).into());
            }
            names.push(name.to_string());
        }
    }
    if names.is_empty() {
        return Err("uplift table has no 'pd_uplift_<scenario>' columns".into());
    }

    let column = |label: String| -> InputResult<usize> {
        headers
            .iter()
            .position(|h| h == label)
            .ok_or_else(|| format!("column '{}' is missing", label).into())
    };

    // a sector listed twice stays twice; registration rejects it
    let mut shocks: BTreeMap<String, Vec<(String, ShockSpec)>> = BTreeMap::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let sector = record.get(sector_col).unwrap_or_default().to_string();
        for name in &names {
            let pd = parse_cell(&record, column(format!("pd_uplift_{}", name))?, i)?;
            let lgd = parse_cell(&record, column(format!("lgd_uplift_{}", name))?, i)?;
            shocks.entry(name.clone()).or_default().push((
                sector.clone(),
                ShockSpec::Uplifts {
                    pd_uplift: pd,
                    lgd_uplift: lgd,
                },
            ));
        }
    }

    Ok(names
        .into_iter()
        .map(|name| ScenarioDefinition {
            shocks: shocks.remove(&name).unwrap_or_default(),
            name,
            description: None,
        })
        .collect())
}

fn parse_cell(record: &csv::StringRecord, idx: usize, row: usize) -> InputResult<Decimal> {
    parse_decimal(record.get(idx).unwrap_or_default())
        .map_err(|reason| format!("row {}: {}", row + 1, reason).into())
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Resolve and validate the path, preventing directory traversal.
fn resolve_path(path: &str) -> InputResult<PathBuf> {
    let p = Path::new(path);
    let canonical = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };

    if !canonical.exists() {
        return Err(format!("File not found: {}", canonical.display()).into());
    }

    if !canonical.is_file() {
        return Err(format!("Not a file: {}", canonical.display()).into());
    }

    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use climate_stress_core::config::MissingShockPolicy;
    use climate_stress_core::scenarios::registry::ScenarioRegistry;
    use climate_stress_core::ErrorCategory;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_portfolio_csv_with_spreadsheet_headers() {
        let csv = "loan_id,sector,country,region,EAD_EUR,PD_base,LGD,maturity_years\n\
                   L1,Energy,FR,Europe,1000,0.02,0.4,12\n\
                   L2,Transport,,,500,0.03,0.5,\n";
        let rows = parse_portfolio_csv(csv).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ead, d("1000"));
        assert_eq!(rows[0].pd0, d("0.02"));
        assert_eq!(rows[0].maturity_years, Some(d("12")));
        assert_eq!(rows[1].country, None);
        assert_eq!(rows[1].maturity_years, None);
    }

    #[test]
    fn test_portfolio_csv_keeps_full_precision() {
        let csv = "loan_id,sector,ead,pd0,lgd0\n\
                   L1,Energy,12345678901234567.89,0.0123456789012345678,0.45\n";
        let rows = parse_portfolio_csv(csv).unwrap();
        assert_eq!(rows[0].ead, d("12345678901234567.89"));
        assert_eq!(rows[0].pd0, d("0.0123456789012345678"));

        let json = serde_json::json!([{
            "loan_id": "L1", "sector": "Energy",
            "ead": "12345678901234567.89", "pd0": "0.0123456789012345678", "lgd0": "0.45"
        }]);
        let from_json = loans_from_value(json).unwrap();
        assert_eq!(rows[0].ead, from_json[0].ead);
        assert_eq!(rows[0].pd0, from_json[0].pd0);
    }

    fn validation_field(e: Box<dyn std::error::Error>) -> String {
        match e.downcast_ref::<ClimateStressError>() {
            Some(ClimateStressError::Validation { field, .. }) => field.clone(),
            _ => panic!("expected a validation error, got {e}"),
        }
    }

    #[test]
    fn test_portfolio_csv_bad_number_is_validation() {
        let csv = "loan_id,sector,ead,pd0,lgd0\n\
                   L0,Energy,10,0.02,0.4\n\
                   L1,Energy,abc,0.02,0.4\n";
        let err = parse_portfolio_csv(csv).unwrap_err();
        assert_eq!(validation_field(err), "loans[1].ead");
    }

    #[test]
    fn test_portfolio_csv_empty_required_cell_is_validation() {
        let csv = "loan_id,sector,ead,pd0,lgd0\nL1,Energy,10,,0.4\n";
        let err = parse_portfolio_csv(csv).unwrap_err();
        assert_eq!(validation_field(err), "loans[0].pd0");
    }

    #[test]
    fn test_portfolio_csv_missing_column() {
        let csv = "loan_id,sector,ead\nL1,Energy,1000\n";
        let err = parse_portfolio_csv(csv).unwrap_err();
        assert_eq!(validation_field(err), "loans.pd0");
    }

    #[test]
    fn test_json_row_of_wrong_shape_is_validation() {
        let v = serde_json::json!([
            {"loan_id": "L1", "sector": "Energy", "ead": "1000", "pd0": "0.02", "lgd0": "0.4"},
            {"loan_id": "L2", "sector": "Energy", "pd0": "0.02", "lgd0": "0.4"}
        ]);
        let err = loans_from_value(v).unwrap_err();
        assert_eq!(validation_field(err), "loans[1]");
    }

    #[test]
    fn test_source_prefix_keeps_core_errors() {
        let core: Box<dyn std::error::Error> = ClimateStressError::Validation {
            field: "loans[0].ead".into(),
            reason: "invalid number 'x'".into(),
        }
        .into();
        assert!(with_source("'p.csv'", core).is::<ClimateStressError>());

        let plain: Box<dyn std::error::Error> = "unexpected end of input".into();
        let wrapped = with_source("'p.csv'", plain);
        assert!(!wrapped.is::<ClimateStressError>());
        assert!(wrapped.to_string().starts_with("Failed to parse 'p.csv'"));
    }

    #[test]
    fn test_loans_from_wrapped_object() {
        let v = serde_json::json!({
            "loans": [{"loan_id": "L1", "sector": "Energy", "ead": "1000", "pd0": "0.02", "lgd0": "0.4"}]
        });
        let rows = loans_from_value(v).unwrap();
        assert_eq!(rows[0].loan_id, "L1");
    }

    #[test]
    fn test_scenarios_from_named_map() {
        let json = r#"{
            "orderly": {"shocks": {"Energy": {"pd_multiplier": "1.2", "lgd_multiplier": "1"}}},
            "disorderly": {"shocks": {"Energy": {"pd_uplift": "1", "lgd_uplift": "0.5"}}}
        }"#;
        let defs = parse_scenarios_json(json).unwrap();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["orderly", "disorderly"]);
    }

    #[test]
    fn test_scenarios_from_yaml_list() {
        let yaml = "scenarios:\n  - name: orderly\n    shocks:\n      Energy:\n        pd_multiplier: 1.2\n        lgd_multiplier: 1.0\n";
        let defs = parse_scenarios_yaml(yaml).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "orderly");
    }

    #[test]
    fn test_repeated_scenario_name_in_json_map_is_duplicate() {
        let json = r#"{
            "orderly": {"shocks": {"Energy": {"pd_multiplier": "1.2", "lgd_multiplier": "1"}}},
            "orderly": {"shocks": {"Energy": {"pd_multiplier": "5", "lgd_multiplier": "1"}}}
        }"#;
        let defs = parse_scenarios_json(json).unwrap();
        assert_eq!(defs.len(), 2);
        let err = ScenarioRegistry::from_definitions(&defs, MissingShockPolicy::Raise).unwrap_err();
        assert!(matches!(err, ClimateStressError::DuplicateScenario(ref n) if n == "orderly"));
    }

    #[test]
    fn test_repeated_scenario_name_in_yaml_map_is_duplicate() {
        let yaml = "orderly:\n  shocks:\n    Energy: {pd_multiplier: '1.2', lgd_multiplier: '1'}\n\
                    orderly:\n  shocks:\n    Energy: {pd_multiplier: '5', lgd_multiplier: '1'}\n";
        let defs = parse_scenarios_yaml(yaml).unwrap();
        let err = ScenarioRegistry::from_definitions(&defs, MissingShockPolicy::Raise).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(matches!(err, ClimateStressError::DuplicateScenario(_)));
    }

    #[test]
    fn test_repeated_sector_in_yaml_is_validation() {
        let yaml = "scenarios:\n  - name: disorderly\n    shocks:\n      Energy: {pd_multiplier: '2', lgd_multiplier: '1'}\n      Energy: {pd_multiplier: '9', lgd_multiplier: '1'}\n";
        let defs = parse_scenarios_yaml(yaml).unwrap();
        assert_eq!(defs[0].shocks.len(), 2);
        let err = ScenarioRegistry::from_definitions(&defs, MissingShockPolicy::Raise).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_uplift_table() {
        let csv = "sector,pd_uplift_Optimiste,lgd_uplift_Optimiste,pd_uplift_Pessimiste,lgd_uplift_Pessimiste\n\
                   Energy,0.1,0.05,1.0,0.5\n\
                   Transport,0.05,0,0.6,0.2\n";
        let defs = parse_uplift_table(csv).unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "Optimiste");
        assert_eq!(defs[1].shocks.len(), 2);
        let (sector, spec) = &defs[1].shocks[0];
        assert_eq!(sector, "Energy");
        let factor = spec.to_factor().unwrap();
        assert_eq!(factor.pd_multiplier, d("2.0"));
        assert_eq!(factor.lgd_multiplier, d("1.5"));
    }

    #[test]
    fn test_uplift_table_repeated_sector_rejected_at_registration() {
        let csv = "sector,pd_uplift_Neutre,lgd_uplift_Neutre\nEnergy,0.2,0\nEnergy,0.3,0\n";
        let defs = parse_uplift_table(csv).unwrap();
        let err = ScenarioRegistry::from_definitions(&defs, MissingShockPolicy::Raise).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_uplift_table_requires_lgd_pair() {
        let csv = "sector,pd_uplift_Neutre\nEnergy,0.2\n";
        assert!(parse_uplift_table(csv).is_err());
    }
}

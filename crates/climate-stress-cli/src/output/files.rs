use rust_decimal::Decimal;
use std::fs;
use std::path::{Path, PathBuf};

use climate_stress_core::stress_test::runner::{ScenarioStatus, StressTestOutput};

type FilesResult<T> = Result<T, Box<dyn std::error::Error>>;

const LOAN_COLUMNS: [&str; 16] = [
    "scenario",
    "loan_id",
    "sector",
    "country",
    "region",
    "ead",
    "pd_base",
    "pd_stressed",
    "delta_pd",
    "lgd_base",
    "lgd_stressed",
    "pd_multiplier",
    "lgd_multiplier",
    "shock_source",
    "expected_loss",
    "incremental_loss",
];

/// Scenario names become part of file names; anything outside
/// `[A-Za-z0-9_-]` is replaced by `_`.
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn opt(value: &Option<Decimal>) -> String {
    value.map(|d| d.to_string()).unwrap_or_default()
}

/// Write the result tables into `dir`:
///
/// - `results_<scenario>.csv`, one row per loan
/// - `summary_by_{sector,country,region}_<scenario>.csv`
/// - `climate_var_summary.csv`, one row per scenario plus the
///   cross-scenario `ClimateVaR_<alpha>%` row
///
/// Failed scenarios only appear in the VaR summary. Returns the paths written.
pub fn write_results(
    dir: &Path,
    result: &StressTestOutput,
) -> FilesResult<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create '{}': {}", dir.display(), e))?;
    let mut written = Vec::new();

    for summary in result.scenario_summaries.iter().filter(|s| s.is_success()) {
        let stem = file_stem(&summary.scenario);

        let path = dir.join(format!("results_{}.csv", stem));
        let mut wtr = csv::Writer::from_path(&path)?;
        wtr.write_record(LOAN_COLUMNS)?;
        for row in result
            .loan_results
            .iter()
            .filter(|r| r.scenario == summary.scenario)
        {
            let l = &row.loss;
            wtr.write_record([
                row.scenario.clone(),
                l.loan_id.clone(),
                l.sector.clone(),
                l.country.clone().unwrap_or_default(),
                l.region.clone().unwrap_or_default(),
                l.ead.to_string(),
                l.pd_base.to_string(),
                l.pd_stressed.to_string(),
                l.delta_pd.to_string(),
                l.lgd_base.to_string(),
                l.lgd_stressed.to_string(),
                l.pd_multiplier.to_string(),
                l.lgd_multiplier.to_string(),
                serde_json::to_value(l.shock_source)?
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
                l.expected_loss.to_string(),
                l.incremental_loss.to_string(),
            ])?;
        }
        wtr.flush()?;
        written.push(path);

        for breakdown in result
            .breakdowns
            .iter()
            .filter(|b| b.scenario == summary.scenario)
        {
            let path = dir.join(format!(
                "summary_by_{}_{}.csv",
                breakdown.dimension.as_str(),
                stem
            ));
            let mut wtr = csv::Writer::from_path(&path)?;
            for row in &breakdown.rows {
                wtr.serialize(row)?;
            }
            wtr.flush()?;
            written.push(path);
        }
    }

    let path = dir.join("climate_var_summary.csv");
    let mut wtr = csv::Writer::from_path(&path)?;
    wtr.write_record([
        "scenario",
        "status",
        "aggregate_expected_loss",
        "incremental_loss",
        "climate_var",
        "var_method",
    ])?;
    for s in &result.scenario_summaries {
        let status = match &s.status {
            ScenarioStatus::Succeeded => "succeeded".to_string(),
            ScenarioStatus::Failed { category, .. } => format!("failed:{}", category),
        };
        let (var, method) = match &s.climate_var {
            Some(v) => (
                v.var.to_string(),
                serde_json::to_value(v.method)?
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
            ),
            None => (String::new(), String::new()),
        };
        wtr.write_record([
            s.scenario.clone(),
            status,
            opt(&s.aggregate_expected_loss),
            opt(&s.incremental_loss),
            var,
            method,
        ])?;
    }
    if let Some(ref cross) = result.cross_scenario_var {
        let pct = (cross.confidence_level * Decimal::ONE_HUNDRED).normalize();
        wtr.write_record([
            format!("ClimateVaR_{}%", pct),
            "succeeded".to_string(),
            cross.expected_loss.to_string(),
            String::new(),
            cross.var.to_string(),
            "cross_scenario".to_string(),
        ])?;
    }
    wtr.flush()?;
    written.push(path);

    Ok(written)
}

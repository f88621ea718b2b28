use serde_json::Value;
use std::io;

use super::scalar;

const SUMMARY_COLUMNS: [&str; 6] = [
    "scenario",
    "status",
    "aggregate_expected_loss",
    "incremental_loss",
    "climate_var",
    "var_method",
];

/// Write output as CSV to stdout. Stress test runs print one row per
/// (scenario, loan) followed by a scenario summary section; other results
/// print field/value pairs.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(stdout.lock());

    let result = value.get("result").unwrap_or(value);
    let written = write_result(&mut wtr, result);

    if let Err(e) = written.and_then(|_| wtr.flush().map_err(csv::Error::from)) {
        tracing::error!(error = %e, "CSV output failed");
    }
}

fn write_result<W: io::Write>(wtr: &mut csv::Writer<W>, result: &Value) -> csv::Result<()> {
    match result.get("loan_results") {
        Some(Value::Array(rows)) => {
            write_rows(wtr, rows)?;
            write_summaries(wtr, result)
        }
        _ => write_fields(wtr, result),
    }
}

/// One row per scenario, failed ones included, then the cross-scenario
/// figure when there is one.
fn write_summaries<W: io::Write>(wtr: &mut csv::Writer<W>, result: &Value) -> csv::Result<()> {
    let summaries = match result.get("scenario_summaries") {
        Some(Value::Array(summaries)) => summaries,
        _ => return Ok(()),
    };
    let field = |v: &Value, key: &str| v.get(key).map(|x| scalar(x, "")).unwrap_or_default();

    wtr.write_record(SUMMARY_COLUMNS)?;
    for s in summaries {
        let status = match s.get("category") {
            Some(category) => format!("failed:{}", scalar(category, "")),
            None => field(s, "status"),
        };
        let var = s.get("climate_var").unwrap_or(&Value::Null);
        wtr.write_record([
            field(s, "scenario"),
            status,
            field(s, "aggregate_expected_loss"),
            field(s, "incremental_loss"),
            field(var, "var"),
            field(var, "method"),
        ])?;
    }
    if let Some(cross) = result.get("cross_scenario_var").filter(|v| !v.is_null()) {
        wtr.write_record([
            "cross_scenario".to_string(),
            "succeeded".to_string(),
            field(cross, "expected_loss"),
            String::new(),
            field(cross, "var"),
            field(cross, "method"),
        ])?;
    }
    Ok(())
}

/// Header is the union of keys in first-seen order, since optional fields
/// are omitted from rows that lack them.
fn write_rows<W: io::Write>(wtr: &mut csv::Writer<W>, rows: &[Value]) -> csv::Result<()> {
    let mut headers: Vec<&str> = Vec::new();
    for row in rows {
        if let Value::Object(map) = row {
            for key in map.keys() {
                if !headers.contains(&key.as_str()) {
                    headers.push(key);
                }
            }
        }
    }
    if headers.is_empty() {
        return Ok(());
    }

    wtr.write_record(&headers)?;
    for row in rows {
        let record: Vec<String> = headers
            .iter()
            .map(|h| row.get(*h).map(|v| scalar(v, "")).unwrap_or_default())
            .collect();
        wtr.write_record(&record)?;
    }
    Ok(())
}

fn write_fields<W: io::Write>(wtr: &mut csv::Writer<W>, value: &Value) -> csv::Result<()> {
    wtr.write_record(["field", "value"])?;
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                wtr.write_record([key.as_str(), &scalar(val, "")])?;
            }
        }
        other => wtr.write_record(["value", &scalar(other, "")])?,
    }
    Ok(())
}

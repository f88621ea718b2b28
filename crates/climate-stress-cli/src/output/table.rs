use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::scalar;

/// Format output as tables. Stress test runs get a per-scenario summary and
/// sector breakdowns; anything else is printed as field/value pairs.
pub fn print_table(value: &Value) {
    let Value::Object(envelope) = value else {
        println!("{}", value);
        return;
    };
    let result = envelope.get("result").unwrap_or(value);

    match result.get("scenario_summaries") {
        Some(Value::Array(summaries)) => print_stress_result(result, summaries),
        _ => print_fields(result),
    }

    print_footer(envelope);
}

fn print_stress_result(result: &Value, summaries: &[Value]) {
    println!(
        "Loans: {}  Total EAD: {}",
        scalar(&result["loan_count"], "0"),
        scalar(&result["total_ead"], "0")
    );

    let mut builder = Builder::default();
    builder.push_record([
        "Scenario",
        "Status",
        "Expected loss",
        "Incremental loss",
        "Climate VaR",
        "Method",
    ]);
    for s in summaries {
        let var = &s["climate_var"];
        let status = match s["status"].as_str() {
            Some("failed") => format!("failed ({})", scalar(&s["category"], "")),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        builder.push_record([
            scalar(&s["scenario"], ""),
            status,
            scalar(&s["aggregate_expected_loss"], "-"),
            scalar(&s["incremental_loss"], "-"),
            scalar(&var["var"], "-"),
            scalar(&var["method"], "-"),
        ]);
    }
    println!("{}", Table::from(builder));

    if let Some(cross) = result.get("cross_scenario_var").filter(|c| !c.is_null()) {
        println!(
            "\nClimate VaR across scenarios (alpha {}): {}  mean scenario loss: {}",
            scalar(&cross["confidence_level"], ""),
            scalar(&cross["var"], ""),
            scalar(&cross["expected_loss"], "")
        );
    }

    if let Some(Value::Array(breakdowns)) = result.get("breakdowns") {
        for b in breakdowns.iter().filter(|b| b["dimension"] == "sector") {
            println!("\nBy sector: {}", scalar(&b["scenario"], ""));
            if let Some(Value::Array(rows)) = b.get("rows") {
                print_rows(rows);
            }
        }
    }
}

fn print_fields(value: &Value) {
    match value {
        Value::Object(map) => {
            let mut builder = Builder::default();
            builder.push_record(["Field", "Value"]);
            for (key, val) in map {
                builder.push_record([key.as_str(), &format_value(val)]);
            }
            println!("{}", Table::from(builder));
        }
        Value::Array(rows) => print_rows(rows),
        other => println!("{}", scalar(other, "null")),
    }
}

fn print_rows(rows: &[Value]) {
    let Some(Value::Object(first)) = rows.first() else {
        println!("(empty)");
        return;
    };

    let headers: Vec<String> = first.keys().cloned().collect();
    let mut builder = Builder::default();
    builder.push_record(&headers);
    for row in rows {
        if let Value::Object(map) = row {
            let record: Vec<String> = headers
                .iter()
                .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                .collect();
            builder.push_record(record);
        }
    }
    println!("{}", Table::from(builder));
}

fn print_footer(envelope: &Map<String, Value>) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {}", w);
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Array(arr) => arr.iter().map(format_value).collect::<Vec<_>>().join(", "),
        other => scalar(other, "null"),
    }
}

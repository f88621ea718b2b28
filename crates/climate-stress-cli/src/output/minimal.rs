use serde_json::Value;

use super::scalar;

/// Print just the headline figures.
///
/// For stress test runs: one `scenario<TAB>VaR` line per scenario (or the
/// failure category), then the cross-scenario VaR. Otherwise the first
/// well-known field found, falling back to the first field.
pub fn print_minimal(value: &Value) {
    let result = value.get("result").unwrap_or(value);

    if let Some(Value::Array(summaries)) = result.get("scenario_summaries") {
        for s in summaries {
            let figure = match s["status"].as_str() {
                Some("failed") => format!("failed:{}", scalar(&s["category"], "")),
                _ => scalar(&s["climate_var"]["var"], ""),
            };
            println!("{}\t{}", scalar(&s["scenario"], ""), figure);
        }
        if let Some(cross) = result.get("cross_scenario_var").filter(|c| !c.is_null()) {
            println!("{}\t{}", scalar(&cross["scenario"], ""), scalar(&cross["var"], ""));
        }
        return;
    }

    let priority_keys = ["valid", "green_financing_share"];

    if let Value::Object(map) = result {
        for key in &priority_keys {
            if let Some(val) = map.get(*key).filter(|v| !v.is_null()) {
                println!("{}", scalar(val, "null"));
                return;
            }
        }

        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, scalar(val, "null"));
            return;
        }
    }

    println!("{}", scalar(result, "null"));
}

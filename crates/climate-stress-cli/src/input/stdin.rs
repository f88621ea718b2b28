use serde_json::Value;
use std::io::{self, Read};

use climate_stress_core::portfolio::loan::LoanRow;

use super::file::{loans_from_value, with_source};

/// Portfolio rows piped on stdin as JSON (a bare array or `{"loans": [...]}`).
/// `None` when stdin is a terminal or nothing was piped.
pub fn read_portfolio_stdin() -> Result<Option<Vec<LoanRow>>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;

    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| format!("Failed to parse portfolio from stdin: {}", e))?;
    loans_from_value(value)
        .map(Some)
        .map_err(|e| with_source("portfolio on stdin", e))
}

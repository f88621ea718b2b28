pub mod indicators;
pub mod run;
pub mod validate;

use serde_json::Value;

use climate_stress_core::portfolio::loan::LoanRow;
use climate_stress_core::ErrorCategory;

use crate::input;

/// What a command hands back to `main`: the value to print and, for runs
/// with failed scenarios, the category that decides the exit code.
pub struct CommandOutput {
    pub value: Value,
    pub failure: Option<ErrorCategory>,
}

impl From<Value> for CommandOutput {
    fn from(value: Value) -> Self {
        CommandOutput {
            value,
            failure: None,
        }
    }
}

/// Portfolio rows from `--portfolio`, falling back to JSON on stdin.
pub(crate) fn load_portfolio_rows(
    path: Option<&str>,
) -> Result<Vec<LoanRow>, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        input::file::read_portfolio(path)
    } else if let Some(rows) = input::stdin::read_portfolio_stdin()? {
        Ok(rows)
    } else {
        Err("--portfolio <file.csv|file.json> or a JSON portfolio on stdin is required".into())
    }
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClimateStressError {
    #[error("Validation error: {field} — {reason}")]
    Validation { field: String, reason: String },

    #[error("Duplicate scenario: '{0}' is already registered")]
    DuplicateScenario(String),

    #[error("Unknown scenario: '{0}'")]
    UnknownScenario(String),

    #[error("Missing sector shock: scenario '{scenario}' has no shock for sector '{sector}'")]
    MissingSectorShock { scenario: String, sector: String },

    #[error("Invalid confidence level: {0} (must lie strictly between 0 and 1)")]
    InvalidConfidenceLevel(Decimal),

    #[error("Numeric instability in {context}")]
    NumericInstability { context: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse failure class reported to callers alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Configuration,
    ConfidenceLevel,
    Computation,
    Serialization,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::ConfidenceLevel => "confidence_level",
            ErrorCategory::Computation => "computation",
            ErrorCategory::Serialization => "serialization",
        }
    }

    /// Process exit code used by the CLI for this category.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorCategory::Serialization => 1,
            ErrorCategory::Validation => 2,
            ErrorCategory::Configuration => 3,
            ErrorCategory::ConfidenceLevel => 4,
            ErrorCategory::Computation => 5,
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ClimateStressError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ClimateStressError::Validation { .. } => ErrorCategory::Validation,
            ClimateStressError::DuplicateScenario(_)
            | ClimateStressError::UnknownScenario(_)
            | ClimateStressError::MissingSectorShock { .. } => ErrorCategory::Configuration,
            ClimateStressError::InvalidConfidenceLevel(_) => ErrorCategory::ConfidenceLevel,
            ClimateStressError::NumericInstability { .. } => ErrorCategory::Computation,
            ClimateStressError::Serialization(_) => ErrorCategory::Serialization,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.category().exit_code()
    }

    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ClimateStressError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn numeric(context: impl Into<String>) -> Self {
        ClimateStressError::NumericInstability {
            context: context.into(),
        }
    }
}

impl From<serde_json::Error> for ClimateStressError {
    fn from(e: serde_json::Error) -> Self {
        ClimateStressError::Serialization(e.to_string())
    }
}

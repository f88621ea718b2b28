pub mod config;
pub mod error;
pub mod numeric;
pub mod types;

pub mod loss;
pub mod portfolio;
pub mod scenarios;
pub mod stress;
pub mod stress_test;
pub mod var;

#[cfg(feature = "indicators")]
pub mod indicators;

pub use config::{MissingShockPolicy, SimulationSettings, StressTestConfig, VarMethod};
pub use error::{ClimateStressError, ErrorCategory};
pub use stress_test::runner::{run_stress_test, StressTestInput, StressTestOutput};
pub use types::*;

/// Standard result type for all climate-stress computations
pub type ClimateStressResult<T> = Result<T, ClimateStressError>;

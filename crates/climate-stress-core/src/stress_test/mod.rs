pub mod breakdown;
pub mod runner;

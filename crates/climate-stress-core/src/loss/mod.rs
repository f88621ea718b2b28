pub mod engine;

#[cfg(feature = "stochastic")]
pub mod simulation;

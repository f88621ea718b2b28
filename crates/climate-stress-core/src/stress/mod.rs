pub mod propagator;

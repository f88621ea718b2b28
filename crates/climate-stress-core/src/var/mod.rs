pub mod climate_var;

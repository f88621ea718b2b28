pub mod green;

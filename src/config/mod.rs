//! Experiment configuration.
//!
//! Loads and validates YAML experiment files: declarations, global
//! variables, the phase script and the runs to simulate.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigLimits, ConfigLoader, LoadResult, LoadWarning, LoaderOptions};
pub use schema::*;
pub use validation::{ValidationResult, Validator};

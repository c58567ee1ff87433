//! Configuration module
//!
//! Handles loading and validation of `raffler` configuration files:
//! scheduler timing, ticket caps, storage backend, and the tournament
//! phase table.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigLimits, ConfigLoader, LoadResult, LoadWarning, LoaderOptions};
pub use schema::*;
pub use validation::{ValidationResult, Validator};

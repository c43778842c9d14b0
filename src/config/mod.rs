//! Configuration Module
//!
//! Handles configuration loading, environment overrides, and validation.

pub mod secrets;
mod types;

pub use secrets::SecretString;
pub use types::*;

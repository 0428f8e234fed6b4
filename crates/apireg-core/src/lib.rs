//! apireg-core — identity types, wire format, and configuration.
//! All other apireg crates depend on this one.

pub mod api;
pub mod config;
pub mod wire;

pub use api::{Api, Environment, ValidationError, Version};

//! Data models for configuration and probe results

pub mod config;
pub mod measurement;

pub use config::{normalize_target, parse_duration, Config, RuntimeConfig};
pub use measurement::Measurement;

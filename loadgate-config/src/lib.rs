//! Domain-driven configuration management for loadgate
//!
//! This crate provides modular configuration split by functional domains
//! (target service, payload, run timeline, thresholds, HTTP transport and
//! logging), with validation, defaults, and environment variable support.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    http::HttpConfig,
    logging::LoggingConfig,
    payload::PayloadConfig,
    run::{RampPolicy, RunConfig, StageConfig},
    target::TargetConfig,
    thresholds::ThresholdsConfig,
    LoadgateConfig,
};

// Re-export utilities
pub use domains::utils::serde_duration;

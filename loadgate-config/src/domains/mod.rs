//! Domain-specific configuration modules

pub mod http;
pub mod logging;
pub mod payload;
pub mod run;
pub mod target;
pub mod thresholds;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main loadgate configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoadgateConfig {
    /// Service under test
    #[serde(default)]
    pub target: target::TargetConfig,

    /// Evaluation request payload
    #[serde(default)]
    pub payload: payload::PayloadConfig,

    /// Timeline and pacing
    #[serde(default)]
    pub run: run::RunConfig,

    /// Pass/fail criteria
    #[serde(default)]
    pub thresholds: thresholds::ThresholdsConfig,

    /// HTTP transport configuration
    #[serde(default)]
    pub http: http::HttpConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl LoadgateConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.target.validate()?;
        self.payload.validate()?;
        self.run.validate()?;
        self.thresholds.validate()?;
        self.http.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = LoadgateConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}

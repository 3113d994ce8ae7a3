//! Decision service under test

use crate::error::ConfigResult;
use crate::validation::{validate_url, validate_url_path, Validatable};
use serde::{Deserialize, Serialize};

/// Location and endpoints of the decision-evaluation service under test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Base URL of the service, e.g. `http://localhost:8080`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path listing the evaluable decision definitions
    #[serde(default = "default_definitions_path")]
    pub definitions_path: String,

    /// Path accepting evaluation requests
    #[serde(default = "default_evaluate_path")]
    pub evaluate_path: String,

    /// Status an evaluation must return to count as successful
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            definitions_path: default_definitions_path(),
            evaluate_path: default_evaluate_path(),
            expected_status: default_expected_status(),
        }
    }
}

impl Validatable for TargetConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_url(&self.base_url, "base_url", self.domain_name())?;
        validate_url_path(&self.definitions_path, "definitions_path", self.domain_name())?;
        validate_url_path(&self.evaluate_path, "evaluate_path", self.domain_name())?;

        if !(100..=599).contains(&self.expected_status) {
            return Err(self.validation_error(format!(
                "expected_status must be a valid HTTP status, got {}",
                self.expected_status
            )));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "target"
    }
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_definitions_path() -> String {
    "/api/v1/definitions".to_string()
}

fn default_evaluate_path() -> String {
    "/api/v1/evaluate".to_string()
}

fn default_expected_status() -> u16 {
    200
}

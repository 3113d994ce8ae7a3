//! Evaluation request payload shape

use crate::error::ConfigResult;
use crate::validation::{validate_inclusive_range, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};

/// The auxiliary integer variable sent with every evaluation request.
///
/// Each iteration draws a value uniformly from `min..=max` and sends it as
/// `variables.<variable>` next to the selected decision key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadConfig {
    /// Name of the variable inside `variables`
    #[serde(default = "default_variable")]
    pub variable: String,

    /// Inclusive lower bound
    #[serde(default = "default_min")]
    pub min: i64,

    /// Inclusive upper bound
    #[serde(default = "default_max")]
    pub max: i64,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            variable: default_variable(),
            min: default_min(),
            max: default_max(),
        }
    }
}

impl Validatable for PayloadConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.variable, "variable", self.domain_name())?;
        validate_inclusive_range(self.min, self.max, &self.variable, self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "payload"
    }
}

fn default_variable() -> String {
    "age".to_string()
}

fn default_min() -> i64 {
    1
}

fn default_max() -> i64 {
    100
}

//! Threshold declarations

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Threshold expressions keyed by metric selector.
///
/// Keys are metric names optionally carrying one tag filter
/// (`http_req_duration{expected_response:true}`); values are expressions
/// such as `p(95)<1500` or `rate<0.1`. Expressions are parsed and checked
/// against the metric catalog by the engine before the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdsConfig(pub BTreeMap<String, Vec<String>>);

impl Default for ThresholdsConfig {
    fn default() -> Self {
        let mut thresholds = BTreeMap::new();
        thresholds.insert("http_req_duration".to_string(), vec!["p(95)<1500".to_string()]);
        thresholds.insert(
            "http_req_duration{expected_response:true}".to_string(),
            vec!["p(99)<3000".to_string()],
        );
        thresholds.insert("errors".to_string(), vec!["rate<0.1".to_string()]);
        Self(thresholds)
    }
}

impl ThresholdsConfig {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Iterate `(selector, expression)` pairs in a stable order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().flat_map(|(selector, exprs)| {
            let selector = selector.as_str();
            exprs.iter().map(move |e| (selector, e.as_str()))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|exprs| exprs.is_empty())
    }
}

impl Validatable for ThresholdsConfig {
    fn validate(&self) -> ConfigResult<()> {
        for (selector, expression) in self.entries() {
            validate_required_string(selector, "metric selector", self.domain_name())?;
            validate_required_string(
                expression,
                &format!("threshold expression for '{}'", selector),
                self.domain_name(),
            )?;
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "thresholds"
    }
}

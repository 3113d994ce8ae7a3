//! Threshold parsing and evaluation
//!
//! A threshold pairs a metric selector with an expression:
//!
//! ```text
//! http_req_duration                          p(95)<1500
//! http_req_duration{expected_response:true}  p(99) < 3s
//! errors                                     rate<0.1
//! ```
//!
//! Expressions follow `<stat> <op> <number>[unit]`. Duration statistics are
//! compared in milliseconds; a trailing `s` scales the bound by 1000.

use crate::metrics::{
    HttpTimingSnapshot, MetricKind, MetricSnapshot, MetricsSnapshot, TrendSnapshot,
};
use loadgate_config::ThresholdsConfig;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThresholdError {
    #[error("invalid metric selector '{0}'")]
    InvalidSelector(String),

    #[error("invalid threshold expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("threshold references undefined metric '{0}'")]
    UnknownMetric(String),

    #[error("tag filter on '{selector}' needs an http timing metric, '{name}' is {kind}")]
    UnsupportedFilter {
        selector: String,
        name: String,
        kind: MetricKind,
    },

    #[error("statistic '{statistic}' cannot be computed for {kind} metric '{name}'")]
    IncompatibleStatistic {
        statistic: Statistic,
        name: String,
        kind: MetricKind,
    },
}

/// Sub-metric filter on a selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TagFilter {
    /// Keep samples whose status is (or is not) an expected response
    ExpectedResponse(bool),
}

/// `name` or `name{tag:value}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricSelector {
    pub name: String,
    pub filter: Option<TagFilter>,
}

impl FromStr for MetricSelector {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ThresholdError::InvalidSelector(s.to_string());
        let s_trimmed = s.trim();

        let (name, filter) = match s_trimmed.split_once('{') {
            None => (s_trimmed, None),
            Some((name, rest)) => {
                let tags = rest.strip_suffix('}').ok_or_else(invalid)?;
                let (key, value) = tags.split_once(':').ok_or_else(invalid)?;
                let filter = match (key.trim(), value.trim()) {
                    ("expected_response", "true") => TagFilter::ExpectedResponse(true),
                    ("expected_response", "false") => TagFilter::ExpectedResponse(false),
                    _ => return Err(invalid()),
                };
                (name.trim(), Some(filter))
            }
        };

        let valid_name = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_name {
            return Err(invalid());
        }

        Ok(Self {
            name: name.to_string(),
            filter,
        })
    }
}

impl fmt::Display for MetricSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.filter {
            None => write!(f, "{}", self.name),
            Some(TagFilter::ExpectedResponse(expected)) => {
                write!(f, "{}{{expected_response:{}}}", self.name, expected)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
    Percentile(f64),
}

impl Statistic {
    fn is_duration(self) -> bool {
        !matches!(self, Statistic::Count | Statistic::Rate)
    }

    fn supports(self, kind: MetricKind) -> bool {
        match self {
            Statistic::Count => true,
            Statistic::Rate => kind == MetricKind::Rate,
            _ => kind != MetricKind::Rate,
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statistic::Avg => write!(f, "avg"),
            Statistic::Min => write!(f, "min"),
            Statistic::Max => write!(f, "max"),
            Statistic::Med => write!(f, "med"),
            Statistic::Count => write!(f, "count"),
            Statistic::Rate => write!(f, "rate"),
            Statistic::Percentile(p) => write!(f, "p({})", p),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Comparison {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Comparison {
    pub fn holds(self, observed: f64, bound: f64) -> bool {
        match self {
            Comparison::Lt => observed < bound,
            Comparison::Le => observed <= bound,
            Comparison::Gt => observed > bound,
            Comparison::Ge => observed >= bound,
            Comparison::Eq => observed == bound,
            Comparison::Ne => observed != bound,
        }
    }
}

/// Parsed `<stat><op><bound>` expression
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdExpr {
    pub statistic: Statistic,
    pub comparison: Comparison,
    /// Milliseconds for duration statistics
    pub bound: f64,
}

impl FromStr for ThresholdExpr {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ThresholdError::InvalidExpression {
            expression: s.to_string(),
            reason: reason.to_string(),
        };

        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let op_start = compact
            .find(['<', '>', '=', '!'])
            .ok_or_else(|| invalid("missing comparison operator"))?;
        let (stat, rest) = compact.split_at(op_start);

        let (comparison, bound) = if let Some(b) = rest.strip_prefix("<=") {
            (Comparison::Le, b)
        } else if let Some(b) = rest.strip_prefix(">=") {
            (Comparison::Ge, b)
        } else if let Some(b) = rest.strip_prefix("==") {
            (Comparison::Eq, b)
        } else if let Some(b) = rest.strip_prefix("!=") {
            (Comparison::Ne, b)
        } else if let Some(b) = rest.strip_prefix('<') {
            (Comparison::Lt, b)
        } else if let Some(b) = rest.strip_prefix('>') {
            (Comparison::Gt, b)
        } else {
            return Err(invalid("unknown comparison operator"));
        };

        let statistic = parse_statistic(stat).ok_or_else(|| invalid("unknown statistic"))?;

        let (number, scale) = if let Some(n) = bound.strip_suffix("ms") {
            (n, Some(1.0))
        } else if let Some(n) = bound.strip_suffix('s') {
            (n, Some(1_000.0))
        } else {
            (bound, None)
        };

        if scale.is_some() && !statistic.is_duration() {
            return Err(invalid("unit suffix on a non-duration statistic"));
        }

        let value: f64 = number.parse().map_err(|_| invalid("bound is not a number"))?;
        if !value.is_finite() {
            return Err(invalid("bound is not finite"));
        }

        Ok(Self {
            statistic,
            comparison,
            bound: value * scale.unwrap_or(1.0),
        })
    }
}

fn parse_statistic(s: &str) -> Option<Statistic> {
    let statistic = match s {
        "avg" => Statistic::Avg,
        "min" => Statistic::Min,
        "max" => Statistic::Max,
        "med" => Statistic::Med,
        "count" => Statistic::Count,
        "rate" => Statistic::Rate,
        _ => {
            let p: f64 = s.strip_prefix("p(")?.strip_suffix(')')?.parse().ok()?;
            if !(0.0..=100.0).contains(&p) {
                return None;
            }
            Statistic::Percentile(p)
        }
    };
    Some(statistic)
}

/// A metric selector with one bound expression
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Threshold {
    pub selector: MetricSelector,
    pub expression: ThresholdExpr,
    /// Expression text as configured
    pub source: String,
}

impl Threshold {
    pub fn parse(selector: &str, expression: &str) -> Result<Self, ThresholdError> {
        Ok(Self {
            selector: selector.parse()?,
            expression: expression.parse()?,
            source: expression.trim().to_string(),
        })
    }

    /// Parse every entry of the thresholds config domain
    pub fn from_config(config: &ThresholdsConfig) -> Result<Vec<Self>, ThresholdError> {
        config
            .entries()
            .map(|(selector, expression)| Self::parse(selector, expression))
            .collect()
    }

    /// Reject selectors the given metric catalog cannot satisfy
    pub fn validate_against(&self, catalog: &[(&str, MetricKind)]) -> Result<(), ThresholdError> {
        let name = &self.selector.name;
        let kind = catalog
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, k)| *k)
            .ok_or_else(|| ThresholdError::UnknownMetric(name.clone()))?;

        if self.selector.filter.is_some() && kind != MetricKind::HttpTiming {
            return Err(ThresholdError::UnsupportedFilter {
                selector: self.selector.to_string(),
                name: name.clone(),
                kind,
            });
        }

        if !self.expression.statistic.supports(kind) {
            return Err(ThresholdError::IncompatibleStatistic {
                statistic: self.expression.statistic,
                name: name.clone(),
                kind,
            });
        }

        Ok(())
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.selector, self.source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
}

impl Outcome {
    pub fn is_pass(self) -> bool {
        self == Outcome::Pass
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pass => write!(f, "PASS"),
            Outcome::Fail => write!(f, "FAIL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub selector: String,
    pub expression: String,
    pub outcome: Outcome,
    /// `None` when the metric had no samples or could not be resolved
    pub observed: Option<f64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub results: Vec<ThresholdResult>,
    pub overall: Outcome,
    /// No thresholds were configured
    pub vacuous: bool,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.overall.is_pass()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.results.iter().filter(|r| !r.outcome.is_pass())
    }
}

/// Evaluate every threshold against one snapshot
pub fn evaluate(thresholds: &[Threshold], snapshot: &MetricsSnapshot) -> Verdict {
    if thresholds.is_empty() {
        warn!("No thresholds configured; the run passes vacuously");
    }

    let results: Vec<ThresholdResult> = thresholds
        .iter()
        .map(|threshold| evaluate_one(threshold, snapshot))
        .collect();

    let overall = if results.iter().all(|r| r.outcome.is_pass()) {
        Outcome::Pass
    } else {
        Outcome::Fail
    };

    Verdict {
        results,
        overall,
        vacuous: thresholds.is_empty(),
    }
}

fn evaluate_one(threshold: &Threshold, snapshot: &MetricsSnapshot) -> ThresholdResult {
    let result = |outcome, observed, reason: Option<String>| ThresholdResult {
        selector: threshold.selector.to_string(),
        expression: threshold.source.clone(),
        outcome,
        observed,
        reason,
    };

    let Some(metric) = snapshot.get(&threshold.selector.name) else {
        return result(Outcome::Fail, None, Some("metric not found".to_string()));
    };

    match observe(threshold, metric) {
        Err(reason) => result(Outcome::Fail, None, Some(reason)),
        Ok(None) => result(Outcome::Pass, None, Some("no samples".to_string())),
        Ok(Some(observed)) => {
            let expr = &threshold.expression;
            let outcome = if expr.comparison.holds(observed, expr.bound) {
                Outcome::Pass
            } else {
                Outcome::Fail
            };
            result(outcome, Some(observed), None)
        }
    }
}

fn observe(threshold: &Threshold, metric: &MetricSnapshot) -> Result<Option<f64>, String> {
    let statistic = threshold.expression.statistic;
    if !statistic.supports(metric.kind()) {
        return Err(format!("'{}' does not apply to a {} metric", statistic, metric.kind()));
    }

    let trend: Cow<'_, TrendSnapshot> = match (metric, threshold.selector.filter) {
        (MetricSnapshot::Rate { .. }, None) => {
            return Ok(match statistic {
                Statistic::Count => Some(metric.count() as f64),
                _ => metric.rate(),
            });
        }
        (MetricSnapshot::Trend(trend), None) => Cow::Borrowed(trend),
        (MetricSnapshot::HttpTiming(timing), filter) => Cow::Owned(filtered(timing, filter)),
        (_, Some(_)) => {
            return Err(format!("tag filter does not apply to a {} metric", metric.kind()));
        }
    };

    Ok(match statistic {
        Statistic::Count => Some(trend.count() as f64),
        Statistic::Avg => trend.avg(),
        Statistic::Min => trend.min(),
        Statistic::Max => trend.max(),
        Statistic::Med => trend.med(),
        Statistic::Percentile(p) => trend.percentile(p),
        Statistic::Rate => None,
    })
}

fn filtered(timing: &HttpTimingSnapshot, filter: Option<TagFilter>) -> TrendSnapshot {
    match filter {
        None => timing.durations(),
        Some(TagFilter::ExpectedResponse(expected)) => timing.durations_by_expected(expected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{
        MetricsAggregator, BUILTIN_METRICS, ERRORS, EVALUATION_DURATION, HTTP_REQ_DURATION,
    };
    use std::time::Duration;

    fn threshold(selector: &str, expression: &str) -> Threshold {
        Threshold::parse(selector, expression).unwrap()
    }

    fn snapshot_with_errors(failed: usize, ok: usize) -> MetricsSnapshot {
        let metrics = MetricsAggregator::with_builtin_metrics();
        for _ in 0..failed {
            metrics.record_rate(ERRORS, true).unwrap();
        }
        for _ in 0..ok {
            metrics.record_rate(ERRORS, false).unwrap();
        }
        metrics.snapshot()
    }

    #[test]
    fn test_parse_expressions() {
        let expr: ThresholdExpr = "p(95)<1500".parse().unwrap();
        assert_eq!(expr.statistic, Statistic::Percentile(95.0));
        assert_eq!(expr.comparison, Comparison::Lt);
        assert_eq!(expr.bound, 1500.0);

        let expr: ThresholdExpr = "p(99.9) <= 3s".parse().unwrap();
        assert_eq!(expr.statistic, Statistic::Percentile(99.9));
        assert_eq!(expr.comparison, Comparison::Le);
        assert_eq!(expr.bound, 3000.0);

        let expr: ThresholdExpr = "rate!=0".parse().unwrap();
        assert_eq!(expr.comparison, Comparison::Ne);

        let expr: ThresholdExpr = "avg>=250ms".parse().unwrap();
        assert_eq!(expr.statistic, Statistic::Avg);
        assert_eq!(expr.comparison, Comparison::Ge);
        assert_eq!(expr.bound, 250.0);
    }

    #[test]
    fn test_parse_rejects_malformed_expressions() {
        let malformed = [
            "p95<1500",
            "p(101)<1",
            "rate",
            "rate=0.1",
            "rate<abc",
            "rate<0.1s",
            "mean<5",
            "count<inf",
        ];
        for bad in malformed {
            let result = bad.parse::<ThresholdExpr>();
            assert!(
                matches!(result, Err(ThresholdError::InvalidExpression { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_selectors() {
        let plain: MetricSelector = "errors".parse().unwrap();
        assert_eq!(plain.filter, None);

        let filtered: MetricSelector = "http_req_duration{expected_response:true}".parse().unwrap();
        assert_eq!(filtered.name, "http_req_duration");
        assert_eq!(filtered.filter, Some(TagFilter::ExpectedResponse(true)));
        assert_eq!(filtered.to_string(), "http_req_duration{expected_response:true}");

        let malformed = [
            "",
            "http_req_duration{status:200}",
            "http_req_duration{expected_response:true",
            "bad name",
        ];
        for bad in malformed {
            assert!(bad.parse::<MetricSelector>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_error_rate_below_bound_passes() {
        let verdict = evaluate(&[threshold("errors", "rate<0.1")], &snapshot_with_errors(0, 50));
        assert_eq!(verdict.overall, Outcome::Pass);
        assert_eq!(verdict.results[0].observed, Some(0.0));
    }

    #[test]
    fn test_error_rate_of_one_fails() {
        let verdict = evaluate(&[threshold("errors", "rate<0.1")], &snapshot_with_errors(50, 0));
        assert_eq!(verdict.overall, Outcome::Fail);
        assert_eq!(verdict.results[0].observed, Some(1.0));
    }

    #[test]
    fn test_missing_metric_fails_closed() {
        let thresholds = [
            threshold("errors", "rate<0.1"),
            threshold("does_not_exist", "count>=0"),
        ];
        let verdict = evaluate(&thresholds, &snapshot_with_errors(0, 10));

        assert_eq!(verdict.results[0].outcome, Outcome::Pass);
        assert_eq!(verdict.results[1].outcome, Outcome::Fail);
        assert_eq!(verdict.results[1].reason.as_deref(), Some("metric not found"));
        assert_eq!(verdict.overall, Outcome::Fail);
        assert_eq!(verdict.failures().count(), 1);
    }

    #[test]
    fn test_evaluation_is_pure() {
        let metrics = MetricsAggregator::with_builtin_metrics();
        for ms in [120, 80, 1_900, 300, 45] {
            metrics
                .record_http_timing(HTTP_REQ_DURATION, 200, Duration::from_millis(ms))
                .unwrap();
        }
        let snapshot = metrics.snapshot();
        let thresholds = [
            threshold("http_req_duration", "p(95)<1500"),
            threshold("http_req_duration", "med<200"),
        ];

        assert_eq!(evaluate(&thresholds, &snapshot), evaluate(&thresholds, &snapshot));
    }

    #[test]
    fn test_empty_threshold_set_passes_vacuously() {
        let verdict = evaluate(&[], &MetricsSnapshot::default());
        assert_eq!(verdict.overall, Outcome::Pass);
        assert!(verdict.vacuous);
        assert!(verdict.results.is_empty());
    }

    #[test]
    fn test_registered_but_empty_metric_passes_without_observation() {
        let snapshot = MetricsAggregator::with_builtin_metrics().snapshot();
        let verdict = evaluate(
            &[threshold("errors", "rate<0.1"), threshold("http_req_duration", "p(95)<1500")],
            &snapshot,
        );

        assert_eq!(verdict.overall, Outcome::Pass);
        assert!(!verdict.vacuous);
        assert!(verdict.results.iter().all(|r| r.observed.is_none()));
    }

    #[test]
    fn test_expected_response_filter_ignores_failed_requests() {
        let metrics = MetricsAggregator::new();
        for _ in 0..20 {
            metrics
                .record_http_timing(HTTP_REQ_DURATION, 200, Duration::from_millis(100))
                .unwrap();
        }
        for _ in 0..5 {
            metrics
                .record_http_timing(HTTP_REQ_DURATION, 500, Duration::from_secs(10))
                .unwrap();
        }
        let snapshot = metrics.snapshot();

        let verdict = evaluate(
            &[
                threshold("http_req_duration{expected_response:true}", "p(99)<3000"),
                threshold("http_req_duration", "p(99)<3000"),
                threshold("http_req_duration{expected_response:false}", "count==5"),
            ],
            &snapshot,
        );

        assert_eq!(verdict.results[0].outcome, Outcome::Pass);
        assert_eq!(verdict.results[0].observed, Some(100.0));
        assert_eq!(verdict.results[1].outcome, Outcome::Fail);
        assert_eq!(verdict.results[2].outcome, Outcome::Pass);
    }

    #[test]
    fn test_incompatible_statistic_fails_at_evaluation() {
        let metrics = MetricsAggregator::new();
        metrics
            .record_trend(EVALUATION_DURATION, Duration::from_millis(10))
            .unwrap();

        let thresholds = [threshold("evaluation_duration", "rate<0.1")];
        let verdict = evaluate(&thresholds, &metrics.snapshot());
        assert_eq!(verdict.overall, Outcome::Fail);
    }

    #[test]
    fn test_catalog_validation() {
        assert!(threshold("errors", "rate<0.1").validate_against(BUILTIN_METRICS).is_ok());
        assert!(threshold("checks", "count>0").validate_against(BUILTIN_METRICS).is_ok());
        assert!(threshold("http_req_duration{expected_response:true}", "p(99)<3s")
            .validate_against(BUILTIN_METRICS)
            .is_ok());

        assert_eq!(
            threshold("does_not_exist", "count>0").validate_against(BUILTIN_METRICS),
            Err(ThresholdError::UnknownMetric("does_not_exist".to_string()))
        );
        let filtered_rate = threshold("errors{expected_response:true}", "rate<0.1");
        assert!(matches!(
            filtered_rate.validate_against(BUILTIN_METRICS),
            Err(ThresholdError::UnsupportedFilter { .. })
        ));
        assert!(matches!(
            threshold("errors", "p(95)<10").validate_against(BUILTIN_METRICS),
            Err(ThresholdError::IncompatibleStatistic { .. })
        ));
        assert!(matches!(
            threshold("iteration_duration", "rate<0.1").validate_against(BUILTIN_METRICS),
            Err(ThresholdError::IncompatibleStatistic { .. })
        ));
    }

    #[test]
    fn test_from_config_parses_default_thresholds() {
        let thresholds = Threshold::from_config(&ThresholdsConfig::default()).unwrap();
        assert_eq!(thresholds.len(), 3);
        for t in &thresholds {
            t.validate_against(BUILTIN_METRICS).unwrap();
        }
    }
}

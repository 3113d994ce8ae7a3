//! End-of-run summary
//!
//! [`RunReport`] gathers everything a finished run produced. Its
//! [`RunReport::summary_export`] form mirrors the `{"metrics": {...}}` layout
//! load-test analysis tooling already reads: trend metrics carry
//! `avg/min/med/max/p(90)/p(95)/p(99)`, rate metrics carry
//! `passes/fails/value`, and each metric lists its thresholds keyed by
//! expression with `true` marking a breach.

use crate::lifecycle::RunContext;
use crate::metrics::{MetricSnapshot, MetricsSnapshot, TrendSnapshot, HTTP_REQ_DURATION};
use crate::scheduler::{aborted_count, ScheduleStats, ShutdownSignal};
use crate::thresholds::{TagFilter, Threshold, Verdict};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Derived request counter in the summary
pub const HTTP_REQS: &str = "http_reqs";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SummaryValues {
    Trend {
        avg: Option<f64>,
        min: Option<f64>,
        med: Option<f64>,
        max: Option<f64>,
        #[serde(rename = "p(90)")]
        p90: Option<f64>,
        #[serde(rename = "p(95)")]
        p95: Option<f64>,
        #[serde(rename = "p(99)")]
        p99: Option<f64>,
        count: usize,
    },
    Rate {
        passes: u64,
        fails: u64,
        value: Option<f64>,
    },
    Counter {
        count: u64,
        rate: f64,
    },
}

impl SummaryValues {
    fn from_trend(trend: &TrendSnapshot) -> Self {
        SummaryValues::Trend {
            avg: trend.avg(),
            min: trend.min(),
            med: trend.med(),
            max: trend.max(),
            p90: trend.percentile(90.0),
            p95: trend.percentile(95.0),
            p99: trend.percentile(99.0),
            count: trend.count(),
        }
    }

    fn from_metric(metric: &MetricSnapshot, filter: Option<TagFilter>) -> Self {
        match (metric, filter) {
            (MetricSnapshot::Rate { passes, total }, _) => SummaryValues::Rate {
                passes: *passes,
                fails: total - passes,
                value: metric.rate(),
            },
            (MetricSnapshot::Trend(trend), _) => Self::from_trend(trend),
            (MetricSnapshot::HttpTiming(timing), None) => Self::from_trend(&timing.durations()),
            (MetricSnapshot::HttpTiming(timing), Some(TagFilter::ExpectedResponse(expected))) => {
                Self::from_trend(&timing.durations_by_expected(expected))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    #[serde(flatten)]
    pub values: SummaryValues,
    /// Expression -> breached
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub thresholds: BTreeMap<String, bool>,
}

/// Everything a finished run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub base_url: String,
    pub targets: usize,
    pub iterations_started: u64,
    pub iterations_completed: u64,
    pub interrupted: Option<ShutdownSignal>,
    pub verdict: Verdict,
    pub metrics: BTreeMap<String, MetricSummary>,
}

impl RunReport {
    /// Assemble the report. `verdict.results` must line up with `thresholds`.
    pub fn new(
        started_at: DateTime<Utc>,
        ctx: &RunContext,
        stats: &ScheduleStats,
        snapshot: &MetricsSnapshot,
        thresholds: &[Threshold],
        verdict: Verdict,
    ) -> Self {
        let elapsed_secs = stats.elapsed.as_secs_f64();
        let mut metrics: BTreeMap<String, MetricSummary> = snapshot
            .iter()
            .map(|(name, metric)| {
                let summary = MetricSummary {
                    values: SummaryValues::from_metric(metric, None),
                    thresholds: BTreeMap::new(),
                };
                (name.to_string(), summary)
            })
            .collect();

        if let Some(requests) = snapshot.get(HTTP_REQ_DURATION) {
            let count = requests.count();
            let rate = if elapsed_secs > 0.0 {
                count as f64 / elapsed_secs
            } else {
                0.0
            };
            metrics.insert(
                HTTP_REQS.to_string(),
                MetricSummary {
                    values: SummaryValues::Counter { count, rate },
                    thresholds: BTreeMap::new(),
                },
            );
        }

        for (threshold, result) in thresholds.iter().zip(&verdict.results) {
            let key = threshold.selector.to_string();
            if !metrics.contains_key(&key) {
                // Filtered selectors get their own sub-metric entry; unknown metrics get none
                let Some(metric) = snapshot.get(&threshold.selector.name) else {
                    continue;
                };
                metrics.insert(
                    key.clone(),
                    MetricSummary {
                        values: SummaryValues::from_metric(metric, threshold.selector.filter),
                        thresholds: BTreeMap::new(),
                    },
                );
            }
            if let Some(summary) = metrics.get_mut(&key) {
                summary
                    .thresholds
                    .insert(result.expression.clone(), !result.outcome.is_pass());
            }
        }

        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            elapsed_secs,
            base_url: ctx.base_url().to_string(),
            targets: ctx.targets().len(),
            iterations_started: stats.iterations_started,
            iterations_completed: stats.iterations_completed,
            interrupted: stats.interrupted,
            verdict,
            metrics,
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict.passed()
    }

    pub fn iterations_aborted(&self) -> u64 {
        aborted_count(self.iterations_started, self.iterations_completed)
    }

    /// Metrics-only export document
    pub fn summary_export(&self) -> serde_json::Value {
        serde_json::json!({
            "metrics": self.metrics,
            "state": {
                "testRunDurationMs": self.elapsed_secs * 1_000.0,
            },
        })
    }

    pub fn summary_export_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.summary_export())
    }
}

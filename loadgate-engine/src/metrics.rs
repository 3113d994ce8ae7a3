//! Metrics aggregation
//!
//! A single [`MetricsAggregator`] owns every metric of a run. Slots record
//! into it concurrently; each `record_*` call is applied atomically under one
//! lock, and [`MetricsAggregator::snapshot`] copies the state out under the
//! same lock before doing any sorting, so writers are only held up for the
//! copy.
//!
//! Percentiles use linear interpolation between closest ranks over the
//! ascending samples: for `p` in `[0, 100]` and `n` samples the rank is
//! `p / 100 * (n - 1)`, and the result interpolates between the samples at
//! `floor(rank)` and `ceil(rank)`.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Request latency and status of every HTTP exchange
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
/// Share of exchanges that were not an expected response
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
/// Wall-clock latency of the evaluate call
pub const EVALUATION_DURATION: &str = "evaluation_duration";
/// Duration of a whole iteration, excluding think time
pub const ITERATION_DURATION: &str = "iteration_duration";
/// Share of failed iterations
pub const ERRORS: &str = "errors";
/// Share of passed checks
pub const CHECKS: &str = "checks";

/// Metrics every run emits, pre-registered so empty runs still report them
pub const BUILTIN_METRICS: &[(&str, MetricKind)] = &[
    (HTTP_REQ_DURATION, MetricKind::HttpTiming),
    (HTTP_REQ_FAILED, MetricKind::Rate),
    (EVALUATION_DURATION, MetricKind::Trend),
    (ITERATION_DURATION, MetricKind::Trend),
    (ERRORS, MetricKind::Rate),
    (CHECKS, MetricKind::Rate),
];

/// Statuses 200..=399 count as an expected response
pub fn is_expected_response(status: u16) -> bool {
    (200..400).contains(&status)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Rate,
    Trend,
    HttpTiming,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Rate => write!(f, "rate"),
            MetricKind::Trend => write!(f, "trend"),
            MetricKind::HttpTiming => write!(f, "http timing"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetricError {
    #[error("metric '{name}' is a {existing} metric, cannot record a {attempted} sample")]
    KindMismatch {
        name: String,
        existing: MetricKind,
        attempted: MetricKind,
    },
}

/// One HTTP exchange as seen by an `HttpTiming` metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HttpSample {
    /// 0 when no response was received
    pub status: u16,
    pub duration_ms: f64,
}

#[derive(Debug, Clone)]
enum MetricState {
    Rate { passes: u64, total: u64 },
    Trend { samples: Vec<f64> },
    HttpTiming { samples: Vec<HttpSample> },
}

impl MetricState {
    fn empty(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Rate => MetricState::Rate { passes: 0, total: 0 },
            MetricKind::Trend => MetricState::Trend { samples: Vec::new() },
            MetricKind::HttpTiming => MetricState::HttpTiming { samples: Vec::new() },
        }
    }

    fn kind(&self) -> MetricKind {
        match self {
            MetricState::Rate { .. } => MetricKind::Rate,
            MetricState::Trend { .. } => MetricKind::Trend,
            MetricState::HttpTiming { .. } => MetricKind::HttpTiming,
        }
    }
}

/// Thread-safe, append-only store of named metrics
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    metrics: Mutex<BTreeMap<String, MetricState>>,
}

impl MetricsAggregator {
    /// Aggregator with no metrics; metrics are created on first record
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregator with the built-in catalog pre-registered
    pub fn with_builtin_metrics() -> Self {
        let aggregator = Self::new();
        for (name, kind) in BUILTIN_METRICS {
            // Fresh map, registration cannot conflict
            let _ = aggregator.register(name, *kind);
        }
        aggregator
    }

    /// Declare a metric without samples. Re-registering with the same kind is a no-op.
    pub fn register(&self, name: &str, kind: MetricKind) -> Result<(), MetricError> {
        let mut metrics = self.metrics.lock();
        Self::entry(&mut metrics, name, kind).map(|_| ())
    }

    pub fn record_rate(&self, name: &str, value: bool) -> Result<(), MetricError> {
        let mut metrics = self.metrics.lock();
        let state = Self::entry(&mut metrics, name, MetricKind::Rate)?;
        if let MetricState::Rate { passes, total } = state {
            *total += 1;
            if value {
                *passes += 1;
            }
        }
        Ok(())
    }

    pub fn record_trend(&self, name: &str, value: Duration) -> Result<(), MetricError> {
        let mut metrics = self.metrics.lock();
        let state = Self::entry(&mut metrics, name, MetricKind::Trend)?;
        if let MetricState::Trend { samples } = state {
            samples.push(as_millis_f64(value));
        }
        Ok(())
    }

    pub fn record_http_timing(
        &self,
        name: &str,
        status: u16,
        duration: Duration,
    ) -> Result<(), MetricError> {
        let mut metrics = self.metrics.lock();
        let state = Self::entry(&mut metrics, name, MetricKind::HttpTiming)?;
        if let MetricState::HttpTiming { samples } = state {
            samples.push(HttpSample {
                status,
                duration_ms: as_millis_f64(duration),
            });
        }
        Ok(())
    }

    /// Point-in-time copy of every metric, with samples in canonical order
    pub fn snapshot(&self) -> MetricsSnapshot {
        let copied: Vec<(String, MetricState)> = {
            let metrics = self.metrics.lock();
            metrics.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        let metrics = copied
            .into_iter()
            .map(|(name, state)| (name, MetricSnapshot::from_state(state)))
            .collect();

        MetricsSnapshot { metrics }
    }

    fn entry<'a>(
        metrics: &'a mut BTreeMap<String, MetricState>,
        name: &str,
        kind: MetricKind,
    ) -> Result<&'a mut MetricState, MetricError> {
        let state = metrics
            .entry(name.to_string())
            .or_insert_with(|| MetricState::empty(kind));

        if state.kind() != kind {
            return Err(MetricError::KindMismatch {
                name: name.to_string(),
                existing: state.kind(),
                attempted: kind,
            });
        }

        Ok(state)
    }
}

fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1_000.0
}

/// Immutable view of all metrics at one instant
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    metrics: BTreeMap<String, MetricSnapshot>,
}

impl MetricsSnapshot {
    pub fn get(&self, name: &str) -> Option<&MetricSnapshot> {
        self.metrics.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricSnapshot)> {
        self.metrics.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// Frozen state of one metric
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricSnapshot {
    Rate { passes: u64, total: u64 },
    Trend(TrendSnapshot),
    HttpTiming(HttpTimingSnapshot),
}

impl MetricSnapshot {
    fn from_state(state: MetricState) -> Self {
        match state {
            MetricState::Rate { passes, total } => MetricSnapshot::Rate { passes, total },
            MetricState::Trend { samples } => {
                MetricSnapshot::Trend(TrendSnapshot::from_samples(samples))
            }
            MetricState::HttpTiming { mut samples } => {
                samples.sort_by(|a, b| {
                    a.duration_ms
                        .total_cmp(&b.duration_ms)
                        .then(a.status.cmp(&b.status))
                });
                MetricSnapshot::HttpTiming(HttpTimingSnapshot { samples })
            }
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricSnapshot::Rate { .. } => MetricKind::Rate,
            MetricSnapshot::Trend(_) => MetricKind::Trend,
            MetricSnapshot::HttpTiming(_) => MetricKind::HttpTiming,
        }
    }

    /// Number of samples recorded
    pub fn count(&self) -> u64 {
        match self {
            MetricSnapshot::Rate { total, .. } => *total,
            MetricSnapshot::Trend(trend) => trend.count() as u64,
            MetricSnapshot::HttpTiming(timing) => timing.samples.len() as u64,
        }
    }

    /// Fraction of `true` samples of a rate metric; `None` when empty or not a rate
    pub fn rate(&self) -> Option<f64> {
        match self {
            MetricSnapshot::Rate { passes, total } if *total > 0 => {
                Some(*passes as f64 / *total as f64)
            }
            _ => None,
        }
    }
}

/// Ascending duration samples in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrendSnapshot {
    samples: Vec<f64>,
}

impl TrendSnapshot {
    pub fn from_samples(mut samples: Vec<f64>) -> Self {
        samples.sort_by(f64::total_cmp);
        Self { samples }
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn sum(&self) -> f64 {
        self.samples.iter().sum()
    }

    pub fn avg(&self) -> Option<f64> {
        (!self.samples.is_empty()).then(|| self.sum() / self.samples.len() as f64)
    }

    pub fn min(&self) -> Option<f64> {
        self.samples.first().copied()
    }

    pub fn max(&self) -> Option<f64> {
        self.samples.last().copied()
    }

    pub fn med(&self) -> Option<f64> {
        self.percentile(50.0)
    }

    pub fn percentile(&self, p: f64) -> Option<f64> {
        percentile(&self.samples, p)
    }
}

/// HTTP samples ordered by duration, then status
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HttpTimingSnapshot {
    samples: Vec<HttpSample>,
}

impl HttpTimingSnapshot {
    pub fn samples(&self) -> &[HttpSample] {
        &self.samples
    }

    /// Durations of all samples
    pub fn durations(&self) -> TrendSnapshot {
        self.durations_where(|_| true)
    }

    /// Durations of samples whose expected-response flag equals `expected`
    pub fn durations_by_expected(&self, expected: bool) -> TrendSnapshot {
        self.durations_where(|s| is_expected_response(s.status) == expected)
    }

    fn durations_where(&self, keep: impl Fn(&HttpSample) -> bool) -> TrendSnapshot {
        // Already sorted by duration, so the filtered sequence stays sorted
        TrendSnapshot {
            samples: self
                .samples
                .iter()
                .filter(|s| keep(s))
                .map(|s| s.duration_ms)
                .collect(),
        }
    }
}

/// Linear-interpolation percentile over ascending `sorted`; `p` is clamped to `[0, 100]`
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_rate_counts_passes_and_total() {
        let metrics = MetricsAggregator::new();
        metrics.record_rate(ERRORS, true).unwrap();
        metrics.record_rate(ERRORS, false).unwrap();
        metrics.record_rate(ERRORS, false).unwrap();
        metrics.record_rate(ERRORS, false).unwrap();

        let snapshot = metrics.snapshot();
        let errors = snapshot.get(ERRORS).unwrap();
        assert_eq!(errors, &MetricSnapshot::Rate { passes: 1, total: 4 });
        assert_eq!(errors.rate(), Some(0.25));
    }

    #[test]
    fn test_identical_samples_report_same_value_at_every_percentile() {
        let metrics = MetricsAggregator::new();
        for _ in 0..37 {
            metrics.record_trend(EVALUATION_DURATION, ms(120)).unwrap();
        }

        let snapshot = metrics.snapshot();
        let MetricSnapshot::Trend(trend) = snapshot.get(EVALUATION_DURATION).unwrap() else {
            panic!("expected a trend");
        };
        for p in [0.0, 1.0, 50.0, 90.0, 95.0, 99.0, 99.9, 100.0] {
            assert_eq!(trend.percentile(p), Some(120.0));
        }
        assert_eq!(trend.avg(), Some(120.0));
    }

    #[test]
    fn test_percentile_interpolates_linearly() {
        let sorted = [10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile(&sorted, 0.0), Some(10.0));
        assert_eq!(percentile(&sorted, 50.0), Some(25.0));
        assert_eq!(percentile(&sorted, 100.0), Some(40.0));
        // rank = 0.9 * 3 = 2.7 -> 30 + 0.7 * 10
        assert!((percentile(&sorted, 90.0).unwrap() - 37.0).abs() < 1e-9);
        assert_eq!(percentile(&[], 95.0), None);
        assert_eq!(percentile(&[7.0], 95.0), Some(7.0));
    }

    #[test]
    fn test_snapshot_is_independent_of_recording_order() {
        let samples: Vec<(u16, u64, bool)> = (0..200)
            .map(|i| (if i % 7 == 0 { 500 } else { 200 }, (i * 37 % 101) as u64, i % 3 == 0))
            .collect();

        let forward = MetricsAggregator::new();
        for (status, latency, failed) in &samples {
            forward.record_http_timing(HTTP_REQ_DURATION, *status, ms(*latency)).unwrap();
            forward.record_trend(EVALUATION_DURATION, ms(*latency)).unwrap();
            forward.record_rate(ERRORS, *failed).unwrap();
        }

        let reversed = MetricsAggregator::new();
        for (status, latency, failed) in samples.iter().rev() {
            reversed.record_rate(ERRORS, *failed).unwrap();
            reversed.record_trend(EVALUATION_DURATION, ms(*latency)).unwrap();
            reversed.record_http_timing(HTTP_REQ_DURATION, *status, ms(*latency)).unwrap();
        }

        assert_eq!(forward.snapshot(), reversed.snapshot());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_lose_no_samples() {
        let metrics = Arc::new(MetricsAggregator::with_builtin_metrics());
        let mut handles = Vec::new();

        for writer in 0..8u64 {
            let metrics = Arc::clone(&metrics);
            handles.push(tokio::spawn(async move {
                for i in 0..500u64 {
                    metrics.record_rate(ERRORS, i % 2 == 0).unwrap();
                    metrics.record_trend(ITERATION_DURATION, ms(writer * 1_000 + i)).unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(
            snapshot.get(ERRORS).unwrap(),
            &MetricSnapshot::Rate {
                passes: 2_000,
                total: 4_000
            }
        );
        assert_eq!(snapshot.get(ITERATION_DURATION).unwrap().count(), 4_000);
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let metrics = MetricsAggregator::with_builtin_metrics();
        let err = metrics.record_trend(ERRORS, ms(5)).unwrap_err();
        assert_eq!(
            err,
            MetricError::KindMismatch {
                name: ERRORS.to_string(),
                existing: MetricKind::Rate,
                attempted: MetricKind::Trend,
            }
        );
        assert_eq!(metrics.snapshot().get(ERRORS).unwrap().count(), 0);
    }

    #[test]
    fn test_builtin_metrics_exist_before_any_sample() {
        let snapshot = MetricsAggregator::with_builtin_metrics().snapshot();
        assert_eq!(snapshot.len(), BUILTIN_METRICS.len());
        for (name, kind) in BUILTIN_METRICS {
            let metric = snapshot.get(name).unwrap();
            assert_eq!(metric.kind(), *kind);
            assert_eq!(metric.count(), 0);
            assert_eq!(metric.rate(), None);
        }
    }

    #[test]
    fn test_http_timing_expected_response_filter() {
        let metrics = MetricsAggregator::new();
        metrics.record_http_timing(HTTP_REQ_DURATION, 200, ms(10)).unwrap();
        metrics.record_http_timing(HTTP_REQ_DURATION, 302, ms(20)).unwrap();
        metrics.record_http_timing(HTTP_REQ_DURATION, 500, ms(900)).unwrap();
        metrics.record_http_timing(HTTP_REQ_DURATION, 0, ms(5_000)).unwrap();

        let snapshot = metrics.snapshot();
        let MetricSnapshot::HttpTiming(timing) = snapshot.get(HTTP_REQ_DURATION).unwrap() else {
            panic!("expected http timing");
        };

        assert_eq!(timing.durations().count(), 4);
        assert_eq!(timing.durations_by_expected(true).samples(), &[10.0, 20.0]);
        assert_eq!(timing.durations_by_expected(false).samples(), &[900.0, 5_000.0]);
    }

    #[test]
    fn test_snapshot_does_not_observe_later_writes() {
        let metrics = MetricsAggregator::new();
        metrics.record_rate(CHECKS, true).unwrap();
        let before = metrics.snapshot();
        metrics.record_rate(CHECKS, false).unwrap();

        assert_eq!(before.get(CHECKS).unwrap().count(), 1);
        assert_eq!(metrics.snapshot().get(CHECKS).unwrap().count(), 2);
    }
}

//! Iteration executor
//!
//! One iteration picks a decision key, draws the auxiliary variable, posts an
//! evaluation request and classifies the response. Every outcome, including
//! transport errors, comes back as an [`IterationResult`]; nothing here
//! returns `Err`.

use crate::lifecycle::RunContext;
use crate::metrics::{
    is_expected_response, MetricError, MetricsAggregator, CHECKS, ERRORS, EVALUATION_DURATION,
    HTTP_REQ_DURATION, HTTP_REQ_FAILED, ITERATION_DURATION,
};
use crate::random::RandomSource;
use chrono::{DateTime, Utc};
use loadgate_config::{PayloadConfig, TargetConfig};
use loadgate_http::{HttpClient, HttpRequest, HttpResponse};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// Name of the check that passes when the response has a non-empty `outputs` array
pub const CHECK_HAS_OUTPUTS: &str = "response has outputs";

/// Why an iteration did not succeed
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum IterationFailure {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("expected status {expected}, got {actual}")]
    UnexpectedStatus { expected: u16, actual: u16 },

    #[error("malformed response body: {0}")]
    MalformedBody(String),

    #[error("response outputs are empty")]
    EmptyOutputs,
}

/// Outcome of one named check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
}

/// Immutable record of a single request/response cycle
#[derive(Debug, Clone, Serialize)]
pub struct IterationResult {
    /// Decision key the request targeted
    pub target: String,
    pub request_payload: Vec<u8>,
    /// Response status, 0 when no response arrived
    pub http_status: u16,
    /// Wall-clock latency of the evaluate call
    pub latency: Duration,
    /// Duration of the whole iteration
    pub duration: Duration,
    pub success: bool,
    pub failure: Option<IterationFailure>,
    pub checks: Vec<CheckOutcome>,
    pub timestamp: DateTime<Utc>,
}

impl IterationResult {
    /// Feed this result into the run's metrics
    pub fn record(&self, metrics: &MetricsAggregator) -> Result<(), MetricError> {
        metrics.record_http_timing(HTTP_REQ_DURATION, self.http_status, self.latency)?;
        metrics.record_rate(HTTP_REQ_FAILED, !is_expected_response(self.http_status))?;
        metrics.record_trend(EVALUATION_DURATION, self.latency)?;
        metrics.record_trend(ITERATION_DURATION, self.duration)?;
        metrics.record_rate(ERRORS, !self.success)?;
        for check in &self.checks {
            metrics.record_rate(CHECKS, check.passed)?;
        }
        Ok(())
    }
}

/// Runs evaluation iterations against the service under test
pub struct IterationExecutor {
    client: Arc<dyn HttpClient>,
    evaluate_path: String,
    expected_status: u16,
    payload: PayloadConfig,
}

impl IterationExecutor {
    pub fn new(client: Arc<dyn HttpClient>, target: &TargetConfig, payload: PayloadConfig) -> Self {
        Self {
            client,
            evaluate_path: target.evaluate_path.clone(),
            expected_status: target.expected_status,
            payload,
        }
    }

    /// Perform one iteration. `ctx` must hold a non-empty target pool.
    pub async fn run_once(&self, ctx: &RunContext, rng: &mut dyn RandomSource) -> IterationResult {
        let started = Instant::now();
        let timestamp = Utc::now();

        let target = ctx.targets()[rng.pick_index(ctx.targets().len())].clone();
        let value = rng.pick_in_range(self.payload.min, self.payload.max);
        let request_payload = self.request_body(&target, value);

        let request = HttpRequest::post_json(ctx.url(&self.evaluate_path), request_payload.clone());
        let call_started = Instant::now();
        let outcome = self.client.send(request).await;
        let latency = call_started.elapsed();

        let (http_status, checks, failure) = match outcome {
            Ok(response) => self.classify(&response),
            Err(err) => {
                debug!("Evaluation of {} failed in transport: {}", target, err);
                let checks = vec![self.status_check(false), has_outputs_check(false)];
                (0, checks, Some(IterationFailure::Transport(err.to_string())))
            }
        };

        IterationResult {
            target,
            request_payload,
            http_status,
            latency,
            duration: started.elapsed(),
            success: failure.is_none(),
            failure,
            checks,
            timestamp,
        }
    }

    fn request_body(&self, target: &str, value: i64) -> Vec<u8> {
        let mut variables = serde_json::Map::new();
        variables.insert(self.payload.variable.clone(), Value::from(value));

        serde_json::json!({
            "decisionKey": target,
            "variables": variables,
        })
        .to_string()
        .into_bytes()
    }

    /// Both checks always run; the first failing one names the failure
    fn classify(
        &self,
        response: &HttpResponse,
    ) -> (u16, Vec<CheckOutcome>, Option<IterationFailure>) {
        let status_ok = response.status == self.expected_status;
        let body = check_outputs(response);

        let checks = vec![self.status_check(status_ok), has_outputs_check(body.is_ok())];
        let failure = if !status_ok {
            Some(IterationFailure::UnexpectedStatus {
                expected: self.expected_status,
                actual: response.status,
            })
        } else {
            body.err()
        };

        (response.status, checks, failure)
    }

    fn status_check(&self, passed: bool) -> CheckOutcome {
        CheckOutcome {
            name: format!("status is {}", self.expected_status),
            passed,
        }
    }
}

fn has_outputs_check(passed: bool) -> CheckOutcome {
    CheckOutcome {
        name: CHECK_HAS_OUTPUTS.to_string(),
        passed,
    }
}

fn check_outputs(response: &HttpResponse) -> Result<(), IterationFailure> {
    let body: Value = response
        .json()
        .map_err(|e| IterationFailure::MalformedBody(e.to_string()))?;

    match body.get("outputs").and_then(Value::as_array) {
        Some(outputs) if outputs.is_empty() => Err(IterationFailure::EmptyOutputs),
        Some(_) => Ok(()),
        None => Err(IterationFailure::MalformedBody(
            "response has no `outputs` array".to_string(),
        )),
    }
}

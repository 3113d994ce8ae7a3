//! Run setup and teardown

use crate::error::SetupFailure;
use crate::metrics::MetricsSnapshot;
use crate::thresholds::Verdict;
use loadgate_config::TargetConfig;
use loadgate_http::{HttpClient, HttpRequest};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Number of keys shown when setup reports the discovered pool
const SAMPLE_KEYS: usize = 5;

/// Read-only state shared by every slot of a run
#[derive(Debug, Clone)]
pub struct RunContext {
    base_url: String,
    targets: Arc<[String]>,
}

impl RunContext {
    /// Context over a non-empty target pool
    pub fn new(base_url: &str, targets: Vec<String>) -> Result<Self, SetupFailure> {
        if targets.is_empty() {
            return Err(SetupFailure::EmptyTargetPool);
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            targets: targets.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Decision keys in discovery order; never empty
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Absolute URL for a service path
    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

#[derive(Debug, Deserialize)]
struct Definition {
    key: String,
}

/// Fetch the target pool once. Any failure aborts the run before load starts.
pub async fn setup(
    client: &dyn HttpClient,
    target: &TargetConfig,
) -> Result<RunContext, SetupFailure> {
    let url = join_url(&target.base_url, &target.definitions_path);
    info!("Fetching decision definitions from {}", url);

    let response = client.send(HttpRequest::get(&url)).await.map_err(|e| {
        error!("Definitions endpoint unreachable: {}", e);
        SetupFailure::Unreachable(e)
    })?;

    if response.status != 200 {
        error!("Failed to fetch decisions: {}", response.status);
        return Err(SetupFailure::UnexpectedStatus(response.status));
    }

    let definitions: Vec<Definition> = response
        .json()
        .map_err(|e| SetupFailure::MalformedBody(e.to_string()))?;

    let keys: Vec<String> = definitions.into_iter().map(|d| d.key).collect();
    let ctx = RunContext::new(&target.base_url, keys).inspect_err(|_| {
        error!("No decision keys available");
    })?;

    let sample: Vec<&str> = ctx
        .targets()
        .iter()
        .take(SAMPLE_KEYS)
        .map(String::as_str)
        .collect();
    info!("Found {} decisions", ctx.targets().len());
    info!("Sample keys: {}", sample.join(", "));

    Ok(ctx)
}

/// Report the outcome of a finished run. Never touches metrics or the verdict.
pub fn teardown(ctx: &RunContext, snapshot: &MetricsSnapshot, verdict: &Verdict) {
    info!("=== Test Summary ===");
    info!("Base URL: {}", ctx.base_url());
    info!("Decisions tested: {}", ctx.targets().len());
    info!("Metrics collected: {}", snapshot.len());

    for failure in verdict.failures() {
        warn!(
            "Threshold breached: {} {} (observed {:?}{})",
            failure.selector,
            failure.expression,
            failure.observed,
            failure.reason.as_deref().map(|r| format!(", {}", r)).unwrap_or_default()
        );
    }
    info!("Verdict: {}", verdict.overall);
}

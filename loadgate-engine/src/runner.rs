//! Run orchestration: validate, set up, drive, evaluate, report

use crate::error::{LoadError, LoadResult};
use crate::executor::IterationExecutor;
use crate::lifecycle::{setup, teardown, RunContext};
use crate::metrics::{MetricsAggregator, BUILTIN_METRICS};
use crate::random::{source_factory, RandomSource, RandomSourceFactory};
use crate::report::RunReport;
use crate::scheduler::{ShutdownSignal, SlotWorker, StageScheduler, WorkerFactory};
use crate::thresholds::{evaluate, Threshold};
use crate::timeline::Timeline;
use async_trait::async_trait;
use chrono::Utc;
use loadgate_config::LoadgateConfig;
use loadgate_http::{HttpClient, HttpManager};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Parse and check the configured thresholds against the built-in metric catalog
pub fn prepare_thresholds(config: &LoadgateConfig) -> LoadResult<Vec<Threshold>> {
    let thresholds = Threshold::from_config(&config.thresholds)
        .map_err(|e| LoadError::Configuration(e.to_string()))?;

    for threshold in &thresholds {
        threshold
            .validate_against(BUILTIN_METRICS)
            .map_err(|e| LoadError::Configuration(e.to_string()))?;
    }

    if thresholds.is_empty() {
        warn!("No thresholds configured; every completed run will pass");
    }

    Ok(thresholds)
}

/// Drives one complete load run
pub struct LoadRunner {
    config: LoadgateConfig,
    client: Arc<dyn HttpClient>,
}

impl LoadRunner {
    /// Runner with a pooled HTTP client built from the `http` domain
    pub fn new(config: LoadgateConfig) -> LoadResult<Self> {
        let client = HttpManager::with_config(config.http.clone().into())?;
        Ok(Self::with_client(config, Arc::new(client)))
    }

    pub fn with_client(config: LoadgateConfig, client: Arc<dyn HttpClient>) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &LoadgateConfig {
        &self.config
    }

    /// Run the full lifecycle.
    ///
    /// Only configuration and setup problems return `Err`; a run that reaches
    /// the scheduler always yields a report, whatever its verdict.
    pub async fn run(
        &self,
        shutdown: Option<broadcast::Receiver<ShutdownSignal>>,
    ) -> LoadResult<RunReport> {
        self.config.validate_all()?;
        let thresholds = prepare_thresholds(&self.config)?;
        let timeline = Timeline::from_config(&self.config.run.stages);
        if timeline.is_empty() {
            warn!("Run timeline has no stages, the run will complete without iterations");
        }

        let ctx = setup(self.client.as_ref(), &self.config.target).await?;
        let started_at = Utc::now();

        let metrics = Arc::new(MetricsAggregator::with_builtin_metrics());
        let factory = Arc::new(IterationWorkerFactory {
            executor: Arc::new(IterationExecutor::new(
                Arc::clone(&self.client),
                &self.config.target,
                self.config.payload.clone(),
            )),
            ctx: ctx.clone(),
            metrics: Arc::clone(&metrics),
            sources: source_factory(self.config.run.seed),
        });

        if let Some(seed) = self.config.run.seed {
            info!("Using seeded random source ({})", seed);
        }

        let scheduler = StageScheduler::new((&self.config.run).into());
        let stats = scheduler.start(&timeline, factory, shutdown).await;

        let snapshot = metrics.snapshot();
        let verdict = evaluate(&thresholds, &snapshot);
        teardown(&ctx, &snapshot, &verdict);

        Ok(RunReport::new(started_at, &ctx, &stats, &snapshot, &thresholds, verdict))
    }
}

struct IterationWorkerFactory {
    executor: Arc<IterationExecutor>,
    ctx: RunContext,
    metrics: Arc<MetricsAggregator>,
    sources: RandomSourceFactory,
}

impl WorkerFactory for IterationWorkerFactory {
    fn spawn_worker(&self, slot: usize) -> Box<dyn SlotWorker> {
        Box::new(IterationWorker {
            executor: Arc::clone(&self.executor),
            ctx: self.ctx.clone(),
            metrics: Arc::clone(&self.metrics),
            rng: (self.sources)(slot),
        })
    }
}

struct IterationWorker {
    executor: Arc<IterationExecutor>,
    ctx: RunContext,
    metrics: Arc<MetricsAggregator>,
    rng: Box<dyn RandomSource>,
}

#[async_trait]
impl SlotWorker for IterationWorker {
    async fn iterate(&mut self) {
        let result = self.executor.run_once(&self.ctx, self.rng.as_mut()).await;
        if let Some(failure) = &result.failure {
            debug!("Iteration against {} failed: {}", result.target, failure);
        }
        if let Err(e) = result.record(&self.metrics) {
            warn!("Dropped iteration sample: {}", e);
        }
    }
}

//! Load generation engine for decision-evaluation services
//!
//! This crate drives staged concurrent load against a decision service and
//! turns what it observed into a pass/fail verdict: a timeline-driven slot
//! scheduler, an iteration executor, a thread-safe metrics aggregator, a
//! threshold evaluator, and the setup/teardown hooks around them.

pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod metrics;
pub mod random;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod thresholds;
pub mod timeline;

// Re-export commonly used types
pub use error::{LoadError, LoadResult, SetupFailure};
pub use executor::{CheckOutcome, IterationExecutor, IterationFailure, IterationResult};
pub use lifecycle::{setup, teardown, RunContext};
pub use metrics::{MetricKind, MetricSnapshot, MetricsAggregator, MetricsSnapshot, BUILTIN_METRICS};
pub use random::{source_factory, FixedSource, RandomSource, RngSource};
pub use report::{MetricSummary, RunReport, SummaryValues};
pub use runner::{prepare_thresholds, LoadRunner};
pub use scheduler::{
    ScheduleStats, SchedulerConfig, ShutdownSignal, SlotWorker, StageScheduler, WorkerFactory,
};
pub use thresholds::{evaluate, Outcome, Threshold, ThresholdError, ThresholdResult, Verdict};
pub use timeline::{Stage, Timeline};

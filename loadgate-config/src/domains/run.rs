//! Run timeline and pacing configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeline, pacing and shutdown behaviour of a load run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Ordered stages; each window starts where the previous one ended
    #[serde(default = "default_stages")]
    pub stages: Vec<StageConfig>,

    /// Pause between two iterations of the same slot
    #[serde(with = "humantime_serde", default = "default_think_time")]
    pub think_time: Duration,

    /// How the slot count moves between stage targets
    #[serde(default)]
    pub ramp: RampPolicy,

    /// How often the scheduler re-evaluates the target concurrency
    #[serde(with = "humantime_serde", default = "default_tick_interval")]
    pub tick_interval: Duration,

    /// How long in-flight iterations may run past the end of the timeline
    #[serde(with = "humantime_serde", default = "default_grace_period")]
    pub grace_period: Duration,

    /// Seed for reproducible target/parameter selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// A single `(duration, target concurrency)` stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub target: u32,
}

impl StageConfig {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

/// Ramp interpolation between stage targets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RampPolicy {
    /// Interpolate linearly from the previous stage's target across the stage window
    #[default]
    Linear,
    /// Jump to the stage's target as soon as the stage starts
    Step,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            think_time: default_think_time(),
            ramp: RampPolicy::default(),
            tick_interval: default_tick_interval(),
            grace_period: default_grace_period(),
            seed: None,
        }
    }
}

impl RunConfig {
    /// Sum of all stage durations
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }
}

impl Validatable for RunConfig {
    fn validate(&self) -> ConfigResult<()> {
        // Durations are unsigned, so a negative duration never gets past parsing
        validate_positive(
            self.tick_interval.as_millis(),
            "tick_interval",
            self.domain_name(),
        )?;

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "run"
    }
}

// Reference profile: ramp to 10, climb to 50, hold, spike to 100, hold, ramp down
fn default_stages() -> Vec<StageConfig> {
    vec![
        StageConfig::new(Duration::from_secs(30), 10),
        StageConfig::new(Duration::from_secs(60), 50),
        StageConfig::new(Duration::from_secs(120), 50),
        StageConfig::new(Duration::from_secs(30), 100),
        StageConfig::new(Duration::from_secs(60), 100),
        StageConfig::new(Duration::from_secs(30), 0),
    ]
}

fn default_think_time() -> Duration {
    Duration::from_millis(100)
}

fn default_tick_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_grace_period() -> Duration {
    Duration::from_secs(30)
}

//! Stage timeline and target-concurrency curve

use loadgate_config::{RampPolicy, StageConfig};
use serde::Serialize;
use std::time::Duration;

/// One `(duration, target concurrency)` window of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub duration: Duration,
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

impl From<StageConfig> for Stage {
    fn from(config: StageConfig) -> Self {
        Self::new(config.duration, config.target)
    }
}

/// Where on the timeline an instant falls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePosition {
    pub index: usize,
    pub stage: Stage,
    /// Time elapsed since the stage started
    pub offset: Duration,
    /// Target of the preceding stage, 0 before the first one
    pub previous_target: u32,
}

/// Immutable ordered sequence of stages laid out back to back from `t = 0`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Timeline {
    stages: Vec<Stage>,
}

impl Timeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn from_config(stages: &[StageConfig]) -> Self {
        Self::new(stages.iter().copied().map(Stage::from).collect())
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Highest target of any stage; the slot pool never grows past it
    pub fn peak_target(&self) -> u32 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }

    /// Locate the stage whose half-open window `[start, start + duration)` contains `elapsed`.
    ///
    /// Zero-duration stages own no instant. Returns `None` once the timeline is exhausted.
    pub fn position(&self, elapsed: Duration) -> Option<StagePosition> {
        let mut start = Duration::ZERO;
        let mut previous_target = 0;

        for (index, stage) in self.stages.iter().enumerate() {
            let end = start + stage.duration;
            if elapsed < end {
                return Some(StagePosition {
                    index,
                    stage: *stage,
                    offset: elapsed - start,
                    previous_target,
                });
            }
            start = end;
            previous_target = stage.target;
        }

        None
    }

    /// Target concurrency of the stage containing `elapsed`; 0 after the last stage.
    ///
    /// Piecewise constant per stage regardless of the ramp policy.
    pub fn current_target_concurrency(&self, elapsed: Duration) -> u32 {
        self.position(elapsed).map(|p| p.stage.target).unwrap_or(0)
    }

    /// Number of slots the scheduler should keep active at `elapsed`.
    ///
    /// `Step` equals [`Self::current_target_concurrency`]. `Linear` moves from
    /// the previous stage's target to the current one across the stage window,
    /// rounding to the nearest slot.
    pub fn effective_concurrency(&self, elapsed: Duration, policy: RampPolicy) -> u32 {
        let Some(position) = self.position(elapsed) else {
            return 0;
        };

        match policy {
            RampPolicy::Step => position.stage.target,
            RampPolicy::Linear => {
                let progress =
                    position.offset.as_secs_f64() / position.stage.duration.as_secs_f64();
                let from = position.previous_target as f64;
                let to = position.stage.target as f64;
                (from + (to - from) * progress).round() as u32
            }
        }
    }
}

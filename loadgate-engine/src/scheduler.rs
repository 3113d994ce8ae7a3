//! Stage scheduler
//!
//! The scheduler samples the timeline every `tick_interval` and grows or
//! shrinks a pool of slot tasks to match the effective concurrency. A slot
//! loops `iterate → think → iterate` until it is told to retire; retirement
//! is observed between iterations, so a slot that is mid-request always
//! finishes that request first.
//!
//! When the timeline ends (or a graceful shutdown arrives) every slot is
//! retired and the in-flight iterations get `grace_period` to finish before
//! they are aborted.

use crate::timeline::Timeline;
use async_trait::async_trait;
use futures::future;
use loadgate_config::{RampPolicy, RunConfig};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Run interruption with escalating urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownSignal {
    /// Stop starting iterations, let in-flight ones finish within the grace period
    Graceful,
    /// Abort in-flight iterations immediately
    Forced,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Graceful => write!(f, "graceful"),
            ShutdownSignal::Forced => write!(f, "forced"),
        }
    }
}

/// Body of one concurrent slot
#[async_trait]
pub trait SlotWorker: Send {
    /// Run one iteration and record its outcome
    async fn iterate(&mut self);
}

/// Creates a worker for every slot the scheduler launches
pub trait WorkerFactory: Send + Sync {
    /// `slot` is unique for the lifetime of a run
    fn spawn_worker(&self, slot: usize) -> Box<dyn SlotWorker>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    pub think_time: Duration,
    pub tick_interval: Duration,
    pub grace_period: Duration,
    pub ramp: RampPolicy,
}

impl From<&RunConfig> for SchedulerConfig {
    fn from(run: &RunConfig) -> Self {
        Self {
            think_time: run.think_time,
            tick_interval: run.tick_interval,
            grace_period: run.grace_period,
            ramp: run.ramp,
        }
    }
}

/// What the scheduler observed while driving a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScheduleStats {
    pub iterations_started: u64,
    pub iterations_completed: u64,
    /// Slots launched over the whole run
    pub slots_spawned: usize,
    pub peak_concurrency: usize,
    pub elapsed: Duration,
    pub interrupted: Option<ShutdownSignal>,
}

impl ScheduleStats {
    /// Iterations cut off by an abort
    pub fn iterations_aborted(&self) -> u64 {
        aborted_count(self.iterations_started, self.iterations_completed)
    }
}

/// Started iterations that never completed
pub fn aborted_count(started: u64, completed: u64) -> u64 {
    started.saturating_sub(completed)
}

#[derive(Default)]
struct Counters {
    started: AtomicU64,
    completed: AtomicU64,
}

struct Slot {
    retire: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct StageScheduler {
    config: SchedulerConfig,
}

impl StageScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Drive `timeline` to completion, or until a shutdown signal arrives
    pub async fn start(
        &self,
        timeline: &Timeline,
        factory: Arc<dyn WorkerFactory>,
        mut shutdown: Option<broadcast::Receiver<ShutdownSignal>>,
    ) -> ScheduleStats {
        let started = Instant::now();
        let total = timeline.total_duration();
        let deadline = started + total;
        let counters = Arc::new(Counters::default());

        let mut active: Vec<Slot> = Vec::new();
        let mut retired: Vec<JoinHandle<()>> = Vec::new();
        let mut next_slot = 0usize;
        let mut peak = 0usize;
        let mut current_stage = None;
        let mut interrupted = None;

        info!(
            "Starting run: {} stages over {:?} (peak target {})",
            timeline.stages().len(),
            total,
            timeline.peak_target()
        );

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let elapsed = started.elapsed();
            if elapsed >= total {
                break;
            }

            if let Some(position) = timeline.position(elapsed) {
                if current_stage != Some(position.index) {
                    current_stage = Some(position.index);
                    info!(
                        "Stage {}/{}: {} -> {} over {:?}",
                        position.index + 1,
                        timeline.stages().len(),
                        position.previous_target,
                        position.stage.target,
                        position.stage.duration
                    );
                }
            }

            let desired = timeline.effective_concurrency(elapsed, self.config.ramp) as usize;
            while active.len() < desired {
                active.push(self.launch(next_slot, factory.as_ref(), &counters));
                next_slot += 1;
            }
            while active.len() > desired {
                if let Some(slot) = active.pop() {
                    let _ = slot.retire.send(true);
                    retired.push(slot.handle);
                }
            }
            retired.retain(|handle| !handle.is_finished());
            peak = peak.max(active.len());

            tokio::select! {
                _ = ticker.tick() => {}
                _ = tokio::time::sleep_until(deadline) => break,
                signal = next_signal(&mut shutdown) => {
                    warn!("Received {} shutdown signal, stopping load", signal);
                    interrupted = Some(signal);
                    break;
                }
            }
        }

        for slot in &active {
            let _ = slot.retire.send(true);
        }
        let handles: Vec<JoinHandle<()>> = active
            .into_iter()
            .map(|slot| slot.handle)
            .chain(retired)
            .collect();

        if interrupted == Some(ShutdownSignal::Forced) {
            abort_all(&handles);
        } else {
            self.drain(handles, &mut shutdown).await;
        }

        let stats = ScheduleStats {
            iterations_started: counters.started.load(Ordering::SeqCst),
            iterations_completed: counters.completed.load(Ordering::SeqCst),
            slots_spawned: next_slot,
            peak_concurrency: peak,
            elapsed: started.elapsed(),
            interrupted,
        };
        info!(
            "Run finished after {:?}: {} iterations completed, {} aborted",
            stats.elapsed,
            stats.iterations_completed,
            stats.iterations_aborted()
        );
        stats
    }

    fn launch(&self, slot: usize, factory: &dyn WorkerFactory, counters: &Arc<Counters>) -> Slot {
        let (retire, retire_rx) = watch::channel(false);
        let worker = factory.spawn_worker(slot);
        let handle = tokio::spawn(slot_loop(
            slot,
            worker,
            retire_rx,
            self.config.think_time,
            Arc::clone(counters),
        ));
        Slot { retire, handle }
    }

    /// Wait for retired slots to finish their iteration, aborting stragglers
    async fn drain(
        &self,
        handles: Vec<JoinHandle<()>>,
        shutdown: &mut Option<broadcast::Receiver<ShutdownSignal>>,
    ) {
        if handles.is_empty() {
            return;
        }

        let aborts: Vec<AbortHandle> = handles.iter().map(JoinHandle::abort_handle).collect();
        debug!("Draining {} slots", handles.len());

        let forced = async {
            while next_signal(shutdown).await != ShutdownSignal::Forced {}
        };

        tokio::select! {
            joined = timeout(self.config.grace_period, future::join_all(handles)) => match joined {
                Ok(results) => {
                    for err in results.into_iter().filter_map(Result::err) {
                        warn!("Slot task ended abnormally: {}", err);
                    }
                }
                Err(_) => {
                    warn!(
                        "Grace period of {:?} elapsed, aborting in-flight iterations",
                        self.config.grace_period
                    );
                    aborts.iter().for_each(AbortHandle::abort);
                }
            },
            _ = forced => {
                warn!("Forced shutdown during drain, aborting in-flight iterations");
                aborts.iter().for_each(AbortHandle::abort);
            }
        }
    }
}

async fn slot_loop(
    slot: usize,
    mut worker: Box<dyn SlotWorker>,
    mut retire: watch::Receiver<bool>,
    think_time: Duration,
    counters: Arc<Counters>,
) {
    debug!("Slot {} started", slot);
    loop {
        if *retire.borrow() {
            break;
        }

        counters.started.fetch_add(1, Ordering::SeqCst);
        worker.iterate().await;
        counters.completed.fetch_add(1, Ordering::SeqCst);

        if think_time.is_zero() {
            tokio::task::yield_now().await;
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(think_time) => {}
            _ = retire.changed() => break,
        }
    }
    debug!("Slot {} retired", slot);
}

fn abort_all(handles: &[JoinHandle<()>]) {
    for handle in handles {
        handle.abort();
    }
}

/// Next shutdown signal; pends forever without a receiver or once all senders are gone
async fn next_signal(shutdown: &mut Option<broadcast::Receiver<ShutdownSignal>>) -> ShutdownSignal {
    let Some(rx) = shutdown else {
        return future::pending().await;
    };

    loop {
        match rx.recv().await {
            Ok(signal) => return signal,
            Err(RecvError::Lagged(skipped)) => {
                debug!("Skipped {} shutdown signals", skipped);
            }
            Err(RecvError::Closed) => return future::pending().await,
        }
    }
}

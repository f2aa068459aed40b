//! Throttled frame sampling for pose re-inference during review.
//!
//! ```text
//! clock tick (30 Hz)
//!   ├─ not every Nth tick?          → OffCycle
//!   ├─ estimator busy?              → Busy
//!   ├─ decoder has no new frame?    → NoNewFrame
//!   ├─ decode failed?               → Unavailable
//!   └─ estimator.submit_frame(frame) → Submitted
//! ```
//!
//! Inference failures during review only clear the overlay; the playback
//! estimator is configured not to report them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::pose::{PoseEstimator, Submission};

use super::PlaybackDecoder;

// ---------------------------------------------------------------------------
// PlaybackClock
// ---------------------------------------------------------------------------

/// Source of the current playback position.
pub trait PlaybackClock: Send + Sync {
    /// Current position, or `None` while paused or stopped.
    fn position(&self) -> Option<Duration>;
}

/// Plays from zero at wall-clock speed and stops at `length`.
pub struct RealtimeClock {
    started: Instant,
    length: Duration,
}

impl RealtimeClock {
    pub fn start(length: Duration) -> Self {
        Self {
            started: Instant::now(),
            length,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.started.elapsed() >= self.length
    }
}

impl PlaybackClock for RealtimeClock {
    fn position(&self) -> Option<Duration> {
        let elapsed = self.started.elapsed();
        (elapsed < self.length).then_some(elapsed)
    }
}

// ---------------------------------------------------------------------------
// PlaybackSampler
// ---------------------------------------------------------------------------

/// Result of one clock tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    OffCycle,
    Busy,
    NoNewFrame,
    Unavailable,
    Submitted,
}

pub struct PlaybackSampler {
    decoder: Mutex<Box<dyn PlaybackDecoder>>,
    estimator: Arc<PoseEstimator>,
    tick_interval: u64,
    ticks: AtomicU64,
}

impl PlaybackSampler {
    /// `tick_interval`: attempt extraction on every Nth tick.
    pub fn new(
        decoder: Box<dyn PlaybackDecoder>,
        estimator: Arc<PoseEstimator>,
        tick_interval: u64,
    ) -> Self {
        Self {
            decoder: Mutex::new(decoder),
            estimator,
            tick_interval: tick_interval.max(1),
            ticks: AtomicU64::new(0),
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// One playback clock callback at `position`.
    pub fn on_tick(&self, position: Duration) -> SampleOutcome {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if tick % self.tick_interval != 0 {
            return SampleOutcome::OffCycle;
        }
        if self.estimator.is_busy() {
            return SampleOutcome::Busy;
        }

        let mut decoder = self
            .decoder
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !decoder.has_new_frame(position) {
            return SampleOutcome::NoNewFrame;
        }
        let Some(frame) = decoder.copy_frame(position) else {
            return SampleOutcome::Unavailable;
        };
        drop(decoder);

        match self.estimator.submit_frame(&frame) {
            Submission::Dispatched => SampleOutcome::Submitted,
            Submission::Busy | Submission::Throttled => SampleOutcome::Busy,
        }
    }

    /// Drive [`on_tick`](Self::on_tick) at `hz` from `clock` on `runtime`.
    /// Ticks are skipped while the clock reports no position.
    pub fn spawn_clock(
        self: &Arc<Self>,
        runtime: &Handle,
        clock: Arc<dyn PlaybackClock>,
        hz: u32,
    ) -> ClockHandle {
        let sampler = Arc::clone(self);
        let period = Duration::from_secs_f64(1.0 / f64::from(hz.max(1)));

        let task = runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(position) = clock.position() else {
                    continue;
                };
                let sampler = Arc::clone(&sampler);
                match tokio::task::spawn_blocking(move || sampler.on_tick(position)).await {
                    Ok(outcome) => log::trace!("playback: {position:?} → {outcome:?}"),
                    Err(e) => {
                        log::warn!("playback: sampling task failed: {e}");
                        break;
                    }
                }
            }
        });

        ClockHandle { task: Some(task) }
    }
}

/// Running playback clock.  Stops on [`stop`](Self::stop) or drop.
pub struct ClockHandle {
    task: Option<JoinHandle<()>>,
}

impl ClockHandle {
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::debug!("playback: clock stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for ClockHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

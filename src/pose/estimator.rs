//! Throttled, drop-while-busy pose estimation.
//!
//! ```text
//! submit_frame(frame)
//!   ├─ inference in flight?        → Busy       (frame dropped)
//!   ├─ not every Nth frame?        → Throttled  (frame dropped)
//!   └─ set in-flight, spawn_blocking(detector.detect)
//!         ├─ Ok(obs)  → PoseUpdated(Some|None)
//!         └─ Err(e)   → InferenceFailed (live only) + PoseUpdated(None)
//!       └─ clear in-flight once the event has been handed to the observer
//! ```
//!
//! At most one inference is outstanding at any instant and nothing is ever
//! queued, so the published pose always comes from the most recently
//! accepted frame.  The overlay is best-effort; capture and recording never
//! wait on it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::capture::{Frame, FrameSink};
use crate::pipeline::events::{deliver_blocking, EventSender, PipelineEvent, PoseSource};

use super::{PoseDetector, PoseModel};

// ---------------------------------------------------------------------------
// EstimatorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstimatorConfig {
    /// Tag carried by every event this estimator publishes.
    pub source: PoseSource,
    /// Run inference on every Nth eligible frame.
    pub frame_interval: u64,
    /// Publish `InferenceFailed` on errors.  The pose is cleared either way.
    pub report_failures: bool,
}

impl EstimatorConfig {
    /// Live camera feed: every `frame_interval`th frame, failures reported.
    pub fn live(frame_interval: u64) -> Self {
        Self {
            source: PoseSource::Live,
            frame_interval: frame_interval.max(1),
            report_failures: true,
        }
    }

    /// Playback re-inference: the sampler already throttles, so every
    /// submission is eligible, and failures only clear the overlay.
    pub fn playback() -> Self {
        Self {
            source: PoseSource::Playback,
            frame_interval: 1,
            report_failures: false,
        }
    }
}

/// What happened to a submitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Dispatched,
    /// Dropped: an inference was already outstanding.
    Busy,
    /// Dropped: not selected by the frame interval.
    Throttled,
}

// ---------------------------------------------------------------------------
// PoseEstimator
// ---------------------------------------------------------------------------

pub struct PoseEstimator {
    detector: Arc<dyn PoseDetector>,
    runtime: Handle,
    events: EventSender,
    config: EstimatorConfig,
    frames_seen: AtomicU64,
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag when dropped, including when the blocking task
/// panics or never gets to run.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PoseEstimator {
    /// * `detector` - shared detector backend.
    /// * `runtime`  - runtime whose blocking pool runs inference.
    /// * `events`   - channel drained by the observer.
    pub fn new(
        detector: Arc<dyn PoseDetector>,
        runtime: Handle,
        events: EventSender,
        config: EstimatorConfig,
    ) -> Self {
        Self {
            detector,
            runtime,
            events,
            config,
            frames_seen: AtomicU64::new(0),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> EstimatorConfig {
        self.config
    }

    /// `true` while an inference is outstanding.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Offer a frame.  Never blocks.
    pub fn submit_frame(&self, frame: &Frame) -> Submission {
        if self.is_busy() {
            return Submission::Busy;
        }

        let seen = self.frames_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % self.config.frame_interval != 0 {
            return Submission::Throttled;
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Submission::Busy;
        }
        let guard = InFlightGuard(Arc::clone(&self.in_flight));

        let detector = Arc::clone(&self.detector);
        let events = self.events.clone();
        let config = self.config;
        let frame = frame.clone();

        self.runtime.spawn_blocking(move || {
            let _guard = guard;
            run_inference(detector.as_ref(), &frame, &events, config);
        });

        Submission::Dispatched
    }
}

impl FrameSink for PoseEstimator {
    fn on_frame(&self, frame: &Frame) {
        let outcome = self.submit_frame(frame);
        log::trace!("pose: frame {:?} → {outcome:?}", frame.pts());
    }
}

fn run_inference(
    detector: &dyn PoseDetector,
    frame: &Frame,
    events: &EventSender,
    config: EstimatorConfig,
) {
    let frame_pts = frame.pts();
    match detector.detect(frame) {
        Ok(observation) => {
            let pose = observation.as_ref().map(PoseModel::from_observation);
            deliver_blocking(
                events,
                PipelineEvent::PoseUpdated {
                    source: config.source,
                    pose,
                    frame_pts,
                },
            );
        }
        Err(e) => {
            log::warn!("pose: inference failed at {frame_pts:?}: {e}");
            if config.report_failures {
                deliver_blocking(
                    events,
                    PipelineEvent::InferenceFailed {
                        source: config.source,
                        message: e.to_string(),
                    },
                );
            }
            deliver_blocking(
                events,
                PipelineEvent::PoseUpdated {
                    source: config.source,
                    pose: None,
                    frame_pts,
                },
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

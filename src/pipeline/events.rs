//! Events delivered from the background pipelines to the observer.
//!
//! Every component publishes into one bounded `tokio::sync::mpsc` channel.
//! The observer (UI loop or the binary's main task) drains it with
//! `try_recv` each frame or `recv().await`, so all callbacks land on a
//! thread that is safe for UI work.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::pose::PoseModel;

/// Default channel depth.  Pose and duration updates arrive at ~10 Hz each,
/// so this leaves several seconds of slack for a stalled observer.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Which estimator produced a pose event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseSource {
    Live,
    Playback,
}

/// What a successful recording produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingOutcome {
    /// Location of the finished artifact.
    pub path: PathBuf,
    /// Last accepted frame timestamp minus the first.
    pub duration: Duration,
    pub frames_written: u64,
    /// Frames refused because the encoder was not ready.
    pub frames_dropped: u64,
}

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Latest pose, or `None` when no body was found (or the overlay should
    /// be cleared).
    PoseUpdated {
        source: PoseSource,
        pose: Option<PoseModel>,
        frame_pts: Duration,
    },
    InferenceFailed {
        source: PoseSource,
        message: String,
    },
    /// Elapsed recording time, ~10 Hz while armed.
    DurationUpdated { seconds: f64 },
    RecordingFinished(RecordingOutcome),
    RecordingFailed { message: String },
}

pub type EventSender = mpsc::Sender<PipelineEvent>;
pub type EventReceiver = mpsc::Receiver<PipelineEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// Send from a worker thread, waiting for room if the observer lags.
///
/// Must not be called from inside an async task.
pub(crate) fn deliver_blocking(events: &EventSender, event: PipelineEvent) {
    if events.blocking_send(event).is_err() {
        log::debug!("pipeline: observer gone, event discarded");
    }
}

/// Send without waiting; drops the event when the channel is full.
pub(crate) fn deliver_lossy(events: &EventSender, event: PipelineEvent) {
    if let Err(e) = events.try_send(event) {
        log::trace!("pipeline: event dropped: {e}");
    }
}

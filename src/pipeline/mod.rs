//! Live practice pipeline.
//!
//! # Architecture
//!
//! ```text
//! FrameSource (frame-delivery thread)
//!        │
//!        ├─▶ PoseEstimator ── spawn_blocking(detect) ──┐
//!        │                                             │
//!        └─▶ Recorder ── video-encoder thread ─────────┤
//!                        duration ticker (tokio) ──────┤
//!                                                      ▼
//!                                  mpsc<PipelineEvent> (bounded)
//!                                                      │
//!                                                      ▼
//!                           PracticeController::handle_event  ← observer task
//! ```
//!
//! Nothing on the observer side performs capture, encoding or inference;
//! it only consumes published events and persists finished sessions.

pub mod controller;
pub mod events;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use controller::{LivePipeline, PracticeController, PracticeUpdate};
pub use events::{
    event_channel, EventReceiver, EventSender, PipelineEvent, PoseSource, RecordingOutcome,
    EVENT_CHANNEL_CAPACITY,
};

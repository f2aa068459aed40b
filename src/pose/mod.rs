//! Pose estimation: detector backends, the per-frame pose model, and the
//! throttled estimator shared by the live and playback pipelines.
//!
//! # Architecture
//!
//! ```text
//! Frame ──▶ PoseEstimator::submit_frame  (throttle + in-flight bound)
//!              │
//!              ▼  spawn_blocking
//!          PoseDetector::detect → RawObservation (bottom-left origin)
//!              │
//!              ▼
//!          PoseModel::from_observation   (confidence filter, y flip)
//!              │
//!              ▼
//!          PipelineEvent::PoseUpdated  ──▶ observer
//! ```

pub mod detector;
pub mod estimator;
pub mod joint;
pub mod model;
#[cfg(feature = "onnx")]
pub mod movenet;
pub mod skeleton;

use thiserror::Error;

pub use detector::{NoModelDetector, PoseDetector};
pub use estimator::{EstimatorConfig, PoseEstimator, Submission};
pub use joint::{Joint, RawJoint, RawObservation};
pub use model::{Handedness, PoseModel, JOINT_CONFIDENCE_THRESHOLD};
#[cfg(feature = "onnx")]
pub use movenet::MoveNetDetector;
pub use skeleton::{overlay_segments, Segment, SKELETON_CONNECTIONS};

/// Errors from a pose detector.  Never fatal; the estimator logs them,
/// clears the pose and carries on with the next eligible frame.
#[derive(Debug, Clone, Error)]
pub enum PoseError {
    #[error("pose model not found: {0}")]
    ModelNotFound(String),

    #[error("pose model failed to load: {0}")]
    ModelLoad(String),

    #[error("pose inference failed: {0}")]
    Inference(String),
}

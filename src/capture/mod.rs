//! Live capture: camera devices and the frame source that feeds the pose
//! estimator and the recorder.
//!
//! # Pipeline
//!
//! ```text
//! CameraBackend::open(position) → CaptureDevice::read_frame
//!     → FrameSource (frame-delivery thread) → FrameSink::on_frame
//!         ├─ PoseEstimator  (throttled, drop-while-busy)
//!         └─ Recorder       (every frame while armed)
//! ```

pub mod device;
pub mod frame;
pub mod source;
#[cfg(feature = "webcam")]
pub mod webcam;

use thiserror::Error;

pub use device::{CameraBackend, CaptureDevice, TestPatternCamera};
pub use frame::{CameraPosition, Frame};
pub use source::{FrameSink, FrameSource};
#[cfg(feature = "webcam")]
pub use webcam::WebcamBackend;

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors raised while acquiring or reading a capture device.
///
/// None of these are fatal: the frame source logs them and degrades to
/// "no device bound".
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera access was not granted")]
    NotGranted,

    #[error("no {0:?} camera is available")]
    NoDevice(frame::CameraPosition),

    #[error("camera disconnected")]
    Disconnected,

    #[error("frame buffer of {len} bytes does not match {width}x{height} RGB8")]
    InvalidFrame { width: u32, height: u32, len: usize },

    #[error("camera backend error: {0}")]
    Backend(String),

    #[error("failed to spawn capture thread: {0}")]
    Thread(#[source] std::io::Error),
}

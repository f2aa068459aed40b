//! Recording subsystem.
//!
//! * [`Recorder`] - arm/disarm state machine that feeds captured frames to
//!   an encoder on its own `video-encoder` thread.
//! * [`EncoderFactory`] / [`VideoEncoder`] - the codec seam; the shipped
//!   implementation writes H.264 in MP4.
//! * [`generate_thumbnail`] - JPEG poster frame of a finished artifact.

pub mod encoder;
#[allow(clippy::module_inception)]
pub mod recorder;
pub mod state;
pub mod thumbnail;

use std::path::PathBuf;

use thiserror::Error;

pub use encoder::{EncoderFactory, H264EncoderFactory, VideoEncoder};
pub use recorder::{Recorder, RecorderSettings, RecordingWindow};
pub use state::RecorderState;
pub use thumbnail::generate_thumbnail;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("cannot write recording to {path:?}: {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },

    #[error("failed to start encoder: {0}")]
    EncoderInit(String),

    #[error("recorder is busy ({})", .0.label())]
    AlreadyActive(RecorderState),

    #[error("encoding failed: {0}")]
    Encode(String),

    #[error("failed to finalize recording: {0}")]
    Finalize(String),
}

//! Video artifact container and codec.
//!
//! Recordings are H.264 in an MP4 container with a single video track.
//! [`ArtifactWriter`] encodes with openh264 and muxes with `muxide`, placing
//! every sample at its capture timestamp.  [`ArtifactReader`] demuxes with
//! `mp4` and decodes with openh264; it backs thumbnails and playback
//! sampling.

pub mod reader;
pub mod writer;

use thiserror::Error;

pub use reader::ArtifactReader;
pub use writer::ArtifactWriter;

/// File extension of recorded artifacts.
pub const ARTIFACT_EXTENSION: &str = "mp4";

/// Target encoding profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputProfile {
    pub width: u32,
    pub height: u32,
    /// Nominal source rate; rate control only, samples keep their own
    /// timestamps.
    pub fps: u32,
    pub bitrate_bps: u32,
}

impl Default for OutputProfile {
    /// Portrait 720×1280 at 30 fps, 2.5 Mbit/s.
    fn default() -> Self {
        Self {
            width: 720,
            height: 1280,
            fps: 30,
            bitrate_bps: 2_500_000,
        }
    }
}

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("video I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("H.264 encoder error: {0}")]
    Encode(String),

    #[error("H.264 decoder error: {0}")]
    Decode(String),

    #[error("MP4 muxer error: {0}")]
    Mux(String),

    #[error("MP4 demuxer error: {0}")]
    Demux(String),

    #[error("malformed video file: {0}")]
    Malformed(String),

    #[error("frame {0} is out of range")]
    FrameOutOfRange(usize),

    #[error("image error: {0}")]
    Image(String),
}

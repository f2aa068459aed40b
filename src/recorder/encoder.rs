//! Encoder seam between the recorder and a concrete container/codec.
//!
//! The recorder owns a `Box<dyn VideoEncoder>` exclusively for its
//! armed/finalizing lifetime and drives it from the `video-encoder` thread.

use std::path::Path;
use std::time::Duration;

use crate::capture::Frame;
use crate::video::{ArtifactWriter, OutputProfile, VideoError};

use super::RecorderError;

/// A single-track video encoder.
pub trait VideoEncoder: Send {
    /// Encode one frame.  `pts` is relative to the first accepted frame.
    fn append(&mut self, frame: &Frame, pts: Duration) -> Result<(), VideoError>;

    /// Flush and close the artifact.
    fn finish(self: Box<Self>) -> Result<(), VideoError>;
}

/// Allocates encoders targeting a path and profile.
pub trait EncoderFactory: Send + Sync {
    fn create(
        &self,
        path: &Path,
        profile: OutputProfile,
    ) -> Result<Box<dyn VideoEncoder>, RecorderError>;
}

// ---------------------------------------------------------------------------
// H.264 / MP4
// ---------------------------------------------------------------------------

/// Encodes with openh264 into an MP4 container.  Samples keep the pts
/// handed to [`VideoEncoder::append`], so the artifact timeline matches
/// capture time whatever the device rate or drop count.
#[derive(Debug, Default, Clone, Copy)]
pub struct H264EncoderFactory;

impl EncoderFactory for H264EncoderFactory {
    fn create(
        &self,
        path: &Path,
        profile: OutputProfile,
    ) -> Result<Box<dyn VideoEncoder>, RecorderError> {
        match ArtifactWriter::create(path, profile) {
            Ok(writer) => Ok(Box::new(H264Encoder { writer })),
            Err(VideoError::Io(io)) => Err(RecorderError::InvalidOutputPath {
                path: path.to_path_buf(),
                reason: io.to_string(),
            }),
            Err(other) => {
                // The file may already exist when the codec refuses to start.
                let _ = std::fs::remove_file(path);
                Err(RecorderError::EncoderInit(other.to_string()))
            }
        }
    }
}

struct H264Encoder {
    writer: ArtifactWriter,
}

impl VideoEncoder for H264Encoder {
    fn append(&mut self, frame: &Frame, pts: Duration) -> Result<(), VideoError> {
        self.writer.write_frame(frame, pts)
    }

    fn finish(self: Box<Self>) -> Result<(), VideoError> {
        let path = self.writer.path().display().to_string();
        let frames = self.writer.finish()?;
        log::debug!("recorder: {path} closed after {frames} frames");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockEncoderFactory  (test-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::{MockEncoderFactory, MockEncoderLog};

//! Decoded-frame access for a stored artifact during review.

use std::path::Path;
use std::time::Duration;

use crate::capture::Frame;
use crate::video::{ArtifactReader, VideoError};

/// Random-access frame extraction keyed by playback position.
pub trait PlaybackDecoder: Send {
    /// `true` when `position` maps to a frame other than the one most
    /// recently returned by [`copy_frame`](Self::copy_frame).
    fn has_new_frame(&self, position: Duration) -> bool;

    /// Decode the frame shown at `position`.  `None` past the end or on a
    /// decode error.
    fn copy_frame(&mut self, position: Duration) -> Option<Frame>;
}

/// [`PlaybackDecoder`] over a recorded MP4 artifact.
pub struct Mp4PlaybackDecoder {
    reader: ArtifactReader,
    last_index: Option<usize>,
}

impl Mp4PlaybackDecoder {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VideoError> {
        Ok(Self {
            reader: ArtifactReader::open(path)?,
            last_index: None,
        })
    }

    /// Presentation time of the artifact's last frame.
    pub fn duration(&self) -> Duration {
        self.reader.duration()
    }
}

impl PlaybackDecoder for Mp4PlaybackDecoder {
    fn has_new_frame(&self, position: Duration) -> bool {
        match self.reader.frame_index_at(position) {
            Some(index) => self.last_index != Some(index),
            None => false,
        }
    }

    fn copy_frame(&mut self, position: Duration) -> Option<Frame> {
        let index = self.reader.frame_index_at(position)?;
        match self.reader.read_frame(index) {
            Ok(frame) => {
                self.last_index = Some(index);
                Some(frame)
            }
            Err(e) => {
                log::warn!("playback: cannot decode frame {index}: {e}");
                None
            }
        }
    }
}

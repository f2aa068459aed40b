//! H.264/MP4 artifact writer.
//!
//! ```text
//! Frame (RGB8) ─ resize to profile ─▶ openh264 Encoder ─▶ Annex B access unit
//!                                                            │
//!                       muxide Muxer::write_video(pts, keyframe) ◀┘
//! ```

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::imageops::FilterType;
use muxide::api::{Muxer, MuxerBuilder, VideoCodec};
use openh264::encoder::{Encoder, EncoderConfig, FrameType};
use openh264::formats::{RgbSliceU8, YUVBuffer};
use openh264::OpenH264API;

use super::{OutputProfile, VideoError};
use crate::capture::Frame;

pub struct ArtifactWriter {
    encoder: Encoder,
    muxer: Muxer<BufWriter<File>>,
    path: PathBuf,
    profile: OutputProfile,
    last_pts: Option<Duration>,
    frames: u64,
}

impl ArtifactWriter {
    /// Create `path` and set up the encoder and muxer for `profile`.
    ///
    /// H.264 4:2:0 needs even, non-zero dimensions.
    pub fn create(path: impl AsRef<Path>, profile: OutputProfile) -> Result<Self, VideoError> {
        let (w, h) = (profile.width, profile.height);
        if w == 0 || h == 0 || w % 2 != 0 || h % 2 != 0 {
            return Err(VideoError::Encode(format!(
                "{w}x{h} is not a valid 4:2:0 frame size"
            )));
        }

        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;

        let config = EncoderConfig::new()
            .set_bitrate_bps(profile.bitrate_bps)
            .max_frame_rate(profile.fps.max(1) as f32);
        let encoder = Encoder::with_api_config(OpenH264API::from_source(), config)
            .map_err(|e| VideoError::Encode(e.to_string()))?;

        let muxer = MuxerBuilder::new(BufWriter::new(file))
            .video(VideoCodec::H264, w, h, f64::from(profile.fps.max(1)))
            .build()
            .map_err(|e| VideoError::Mux(e.to_string()))?;

        Ok(Self {
            encoder,
            muxer,
            path,
            profile,
            last_pts: None,
            frames: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Access units written to the container so far.
    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    /// Encode `frame` and place it at `pts` on the artifact timeline.
    ///
    /// Frames are rescaled to the profile size when needed.  A frame whose
    /// `pts` is not after the previous one is skipped, as is a frame the
    /// rate control decides not to code.
    pub fn write_frame(&mut self, frame: &Frame, pts: Duration) -> Result<(), VideoError> {
        if let Some(last) = self.last_pts.filter(|last| pts <= *last) {
            log::debug!("video: skipping frame at {pts:?}, not after {last:?}");
            return Ok(());
        }

        let (w, h) = (self.profile.width, self.profile.height);
        let scaled;
        let rgb = if frame.width() == w && frame.height() == h {
            frame.data()
        } else {
            scaled = image::imageops::resize(&frame.to_image(), w, h, FilterType::Triangle);
            scaled.as_raw().as_slice()
        };

        let yuv = YUVBuffer::from_rgb_source(RgbSliceU8::new(rgb, (w as usize, h as usize)));
        let bitstream = self
            .encoder
            .encode(&yuv)
            .map_err(|e| VideoError::Encode(e.to_string()))?;
        let keyframe = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);
        let access_unit = bitstream.to_vec();
        if access_unit.is_empty() {
            log::trace!("video: encoder skipped frame at {pts:?}");
            return Ok(());
        }

        self.muxer
            .write_video(pts.as_secs_f64(), &access_unit, keyframe)
            .map_err(|e| VideoError::Mux(e.to_string()))?;
        self.last_pts = Some(pts);
        self.frames += 1;
        Ok(())
    }

    /// Write the index and close the file.
    pub fn finish(self) -> Result<u64, VideoError> {
        self.muxer
            .finish()
            .map_err(|e| VideoError::Mux(e.to_string()))?;
        Ok(self.frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(width: u32, height: u32) -> OutputProfile {
        OutputProfile {
            width,
            height,
            fps: 30,
            bitrate_bps: 500_000,
        }
    }

    fn frame(width: u32, height: u32, shade: u8) -> Frame {
        let pixels = vec![shade; (width * height * 3) as usize];
        Frame::from_rgb(width, height, pixels, Duration::ZERO).unwrap()
    }

    #[test]
    fn odd_dimensions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = ArtifactWriter::create(dir.path().join("clip.mp4"), profile(33, 64));
        assert!(matches!(result, Err(VideoError::Encode(_))));
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ArtifactWriter::create(dir.path().join("nope").join("clip.mp4"), profile(32, 32));
        assert!(matches!(result, Err(VideoError::Io(_))));
    }

    #[test]
    fn repeated_timestamps_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ArtifactWriter::create(dir.path().join("clip.mp4"), profile(32, 32)).unwrap();

        writer.write_frame(&frame(32, 32, 10), Duration::ZERO).unwrap();
        writer.write_frame(&frame(32, 32, 20), Duration::ZERO).unwrap();
        writer
            .write_frame(&frame(32, 32, 30), Duration::from_millis(40))
            .unwrap();

        assert_eq!(writer.frames_written(), 2);
        assert_eq!(writer.finish().unwrap(), 2);
    }

    #[test]
    fn mismatched_frames_are_rescaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        let mut writer = ArtifactWriter::create(&path, profile(32, 64)).unwrap();

        writer.write_frame(&frame(90, 40, 128), Duration::ZERO).unwrap();
        writer.finish().unwrap();

        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}

//! MP4 artifact reader.
//!
//! The sample table is indexed once on open.  Decoding is sequential from
//! the nearest preceding sync sample; reading forward reuses the running
//! decoder, seeking backwards restarts it.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use mp4::{MediaType, Mp4Reader, TrackType};
use openh264::decoder::Decoder;
use openh264::formats::YUVSource;

use super::VideoError;
use crate::capture::Frame;

const START_CODE: [u8; 4] = [0, 0, 0, 1];

#[derive(Debug, Clone, Copy)]
struct SampleEntry {
    pts: Duration,
    sync: bool,
}

/// Random-access frame reader over a recorded artifact.
pub struct ArtifactReader {
    demuxer: Mp4Reader<BufReader<File>>,
    track_id: u32,
    width: u32,
    height: u32,
    /// SPS and PPS from the sample description, as Annex B.
    parameter_sets: Vec<u8>,
    samples: Vec<SampleEntry>,
    decoder: Option<Decoder>,
    /// Sample the running decoder expects next.
    next_sample: usize,
}

impl ArtifactReader {
    /// Parse the container and index the video track's samples.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VideoError> {
        let file = File::open(path.as_ref())?;
        let size = file.metadata()?.len();
        let mut demuxer = Mp4Reader::read_header(BufReader::new(file), size).map_err(demux)?;

        let (track_id, width, height, timescale, count, parameter_sets) = {
            let (id, track) = demuxer
                .tracks()
                .iter()
                .find(|(_, track)| matches!(track.track_type(), Ok(TrackType::Video)))
                .ok_or_else(|| VideoError::Malformed("no video track".into()))?;
            if !matches!(track.media_type(), Ok(MediaType::H264)) {
                return Err(VideoError::Malformed("video track is not H.264".into()));
            }

            let mut sets = Vec::new();
            for nal in [track.sequence_parameter_set(), track.picture_parameter_set()]
                .into_iter()
                .flatten()
            {
                sets.extend_from_slice(&START_CODE);
                sets.extend_from_slice(nal);
            }
            (
                *id,
                u32::from(track.width()),
                u32::from(track.height()),
                track.timescale(),
                track.sample_count(),
                sets,
            )
        };
        if timescale == 0 {
            return Err(VideoError::Malformed("video track has no timescale".into()));
        }

        let mut samples = Vec::with_capacity(count as usize);
        for sample_id in 1..=count {
            let Some(sample) = demuxer.read_sample(track_id, sample_id).map_err(demux)? else {
                log::warn!("video: sample table ends early at {sample_id} of {count}");
                break;
            };
            let ticks = i64::try_from(sample.start_time).unwrap_or(i64::MAX)
                + i64::from(sample.rendering_offset);
            samples.push(SampleEntry {
                pts: ticks_to_duration(u64::try_from(ticks).unwrap_or(0), timescale),
                sync: sample.is_sync,
            });
        }

        Ok(Self {
            demuxer,
            track_id,
            width,
            height,
            parameter_sets,
            samples,
            decoder: None,
            next_sample: 0,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len()
    }

    /// Presentation time of the last frame, which is also the span the
    /// recorder reports for the recording.
    pub fn duration(&self) -> Duration {
        self.samples.last().map_or(Duration::ZERO, |s| s.pts)
    }

    pub fn frame_pts(&self, index: usize) -> Option<Duration> {
        self.samples.get(index).map(|s| s.pts)
    }

    /// Frame on screen at `position`: the last one whose timestamp is not
    /// after it.  `None` before the first frame and past the end.
    pub fn frame_index_at(&self, position: Duration) -> Option<usize> {
        if self.samples.is_empty() || position > self.duration() {
            return None;
        }
        self.samples
            .partition_point(|s| s.pts <= position)
            .checked_sub(1)
    }

    /// Decode frame `index` to RGB8.  The frame's pts is its presentation
    /// time.
    pub fn read_frame(&mut self, index: usize) -> Result<Frame, VideoError> {
        let target = *self
            .samples
            .get(index)
            .ok_or(VideoError::FrameOutOfRange(index))?;

        let keyframe = self.samples[..=index]
            .iter()
            .rposition(|s| s.sync)
            .unwrap_or(0);
        let resume = self.decoder.is_some() && (keyframe..=index).contains(&self.next_sample);
        let start = if resume {
            self.next_sample
        } else {
            self.decoder = Some(Decoder::new().map_err(|e| VideoError::Decode(e.to_string()))?);
            keyframe
        };

        for i in start..=index {
            let sample = self
                .demuxer
                .read_sample(self.track_id, sample_id(i))
                .map_err(demux)?
                .ok_or(VideoError::FrameOutOfRange(i))?;

            let mut packet = if i == start && !resume {
                self.parameter_sets.clone()
            } else {
                Vec::new()
            };
            append_annex_b(&sample.bytes, &mut packet);

            // A failed decode forces the next read to restart.
            self.next_sample = usize::MAX;
            let decoder = self
                .decoder
                .as_mut()
                .ok_or_else(|| VideoError::Decode("decoder not initialised".into()))?;
            let decoded = decoder
                .decode(&packet)
                .map_err(|e| VideoError::Decode(e.to_string()))?;
            self.next_sample = i + 1;

            if i == index {
                let yuv = decoded.ok_or_else(|| {
                    VideoError::Decode(format!("frame {index} produced no picture"))
                })?;
                let (w, h) = yuv.dimensions();
                let mut rgb = vec![0u8; w * h * Frame::BYTES_PER_PIXEL];
                yuv.write_rgb8(&mut rgb);
                return Frame::from_rgb(w as u32, h as u32, rgb, target.pts)
                    .map_err(|e| VideoError::Decode(e.to_string()));
            }
        }
        Err(VideoError::FrameOutOfRange(index))
    }
}

fn demux(e: mp4::Error) -> VideoError {
    VideoError::Demux(e.to_string())
}

/// `mp4` numbers samples from 1.
fn sample_id(index: usize) -> u32 {
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}

fn ticks_to_duration(ticks: u64, timescale: u32) -> Duration {
    let timescale = u64::from(timescale);
    let nanos = (ticks % timescale) * 1_000_000_000 / timescale;
    Duration::new(ticks / timescale, nanos as u32)
}

/// Rewrite length-prefixed NAL units as Annex B.  Samples that already
/// carry start codes are copied through.
fn append_annex_b(sample: &[u8], out: &mut Vec<u8>) {
    if sample.starts_with(&START_CODE) || sample.starts_with(&START_CODE[1..]) {
        out.extend_from_slice(sample);
        return;
    }
    let mut rest = sample;
    while rest.len() >= 4 {
        let len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        let Some(nal) = rest.get(4..4 + len) else {
            log::warn!("video: truncated NAL unit ({len} bytes declared)");
            break;
        };
        out.extend_from_slice(&START_CODE);
        out.extend_from_slice(nal);
        rest = &rest[4 + len..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::{ArtifactWriter, OutputProfile};

    const SIZE: u32 = 32;

    /// `shades[i]` is written at `pts[i]`.
    fn write_clip(path: &Path, shades: &[u8], pts: &[Duration]) {
        let profile = OutputProfile {
            width: SIZE,
            height: SIZE,
            fps: 30,
            bitrate_bps: 1_000_000,
        };
        let mut writer = ArtifactWriter::create(path, profile).unwrap();
        for (&shade, &at) in shades.iter().zip(pts) {
            let pixels = vec![shade; (SIZE * SIZE * 3) as usize];
            let frame = Frame::from_rgb(SIZE, SIZE, pixels, at).unwrap();
            writer.write_frame(&frame, at).unwrap();
        }
        writer.finish().unwrap();
    }

    fn every(step_ms: u64, count: u64) -> Vec<Duration> {
        (0..count).map(|i| Duration::from_millis(i * step_ms)).collect()
    }

    fn mean_luma(frame: &Frame) -> f64 {
        let data = frame.data();
        data.iter().map(|&b| f64::from(b)).sum::<f64>() / data.len() as f64
    }

    #[test]
    fn timeline_follows_sample_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        // 15 fps source into a 30 fps profile.
        write_clip(&path, &[100; 31], &every(1_000 / 15, 31));

        let reader = ArtifactReader::open(&path).unwrap();
        assert_eq!(reader.frame_count(), 31);
        assert_eq!(reader.dimensions(), (SIZE, SIZE));
        let expected = Duration::from_millis(30 * 1_000 / 15);
        assert!(reader.duration().abs_diff(expected) < Duration::from_millis(2));
        assert_eq!(reader.frame_index_at(Duration::from_millis(1_010)), Some(15));
    }

    #[test]
    fn frame_index_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        write_clip(&path, &[50; 3], &every(100, 3));
        let reader = ArtifactReader::open(&path).unwrap();

        assert_eq!(reader.frame_index_at(Duration::ZERO), Some(0));
        assert_eq!(reader.frame_index_at(Duration::from_millis(150)), Some(1));
        assert_eq!(reader.frame_index_at(Duration::from_millis(200)), Some(2));
        assert_eq!(reader.frame_index_at(Duration::from_millis(201)), None);
    }

    #[test]
    fn decodes_forward_and_backward() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        write_clip(&path, &[20, 20, 230, 230], &every(100, 4));
        let mut reader = ArtifactReader::open(&path).unwrap();

        let first = reader.read_frame(0).unwrap();
        assert_eq!((first.width(), first.height()), (SIZE, SIZE));
        assert_eq!(first.pts(), Duration::ZERO);
        assert!(mean_luma(&first) < 80.0);

        let last = reader.read_frame(3).unwrap();
        assert!(last.pts().abs_diff(Duration::from_millis(300)) < Duration::from_millis(2));
        assert!(mean_luma(&last) > 170.0);

        let again = reader.read_frame(1).unwrap();
        assert!(mean_luma(&again) < 80.0);
        assert!(matches!(reader.read_frame(4), Err(VideoError::FrameOutOfRange(4))));
    }

    #[test]
    fn non_mp4_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"definitely not video").unwrap();
        assert!(ArtifactReader::open(&path).is_err());
    }

    #[test]
    fn length_prefixed_units_become_annex_b() {
        let mut out = Vec::new();
        append_annex_b(&[0, 0, 0, 2, 0x65, 0xAA, 0, 0, 0, 1, 0x41], &mut out);
        assert_eq!(out, vec![0, 0, 0, 1, 0x65, 0xAA, 0, 0, 0, 1, 0x41]);

        let mut passthrough = Vec::new();
        append_annex_b(&[0, 0, 1, 0x65], &mut passthrough);
        assert_eq!(passthrough, vec![0, 0, 1, 0x65]);
    }

    #[test]
    fn ticks_convert_exactly() {
        assert_eq!(ticks_to_duration(90_000, 90_000), Duration::from_secs(1));
        assert_eq!(ticks_to_duration(6_000, 90_000), Duration::from_nanos(66_666_666));
    }
}

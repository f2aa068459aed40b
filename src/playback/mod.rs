//! Review of stored recordings.
//!
//! A [`PlaybackSampler`] pulls decoded frames out of a
//! [`PlaybackDecoder`] as a [`PlaybackClock`] advances and feeds a subset
//! of them to a playback-configured [`PoseEstimator`](crate::pose::PoseEstimator).

pub mod decoder;
pub mod sampler;

pub use decoder::{Mp4PlaybackDecoder, PlaybackDecoder};
pub use sampler::{ClockHandle, PlaybackClock, PlaybackSampler, RealtimeClock, SampleOutcome};

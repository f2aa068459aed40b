//! throw-coach: camera capture, pose-guided arm-angle feedback and
//! practice-session recording.
//!
//! # Modules
//!
//! * [`capture`]  - camera backends and the frame source.
//! * [`pose`]     - detector backends, pose model and throttled estimator.
//! * [`recorder`] - armed recording into a video artifact, thumbnails.
//! * [`playback`] - throttled re-inference over a stored artifact.
//! * [`session`]  - session records and their JSON store.
//! * [`pipeline`] - event channel, live wiring and the practice controller.
//! * [`video`]    - H.264/MP4 artifact writer and reader.
//! * [`geometry`] - joint-angle math.
//! * [`config`]   - settings and application paths.

pub mod capture;
pub mod config;
pub mod geometry;
pub mod pipeline;
pub mod playback;
pub mod pose;
pub mod recorder;
pub mod session;
pub mod video;

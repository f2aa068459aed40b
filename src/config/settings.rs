//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::capture::CameraPosition;
use crate::pose::Handedness;
use crate::recorder::RecorderSettings;
use crate::video::OutputProfile;

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

/// Camera selection and pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Position bound when capture starts.
    pub initial_position: CameraPosition,
    /// Nominal device frame rate.
    pub frame_rate: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            initial_position: CameraPosition::Back,
            frame_rate: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// InferenceConfig
// ---------------------------------------------------------------------------

/// Pose-estimation throttling and model selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Live feed: run inference on every Nth frame.
    pub live_frame_interval: u64,
    /// Review: attempt extraction on every Nth playback clock tick.
    pub playback_tick_interval: u64,
    /// Review: playback clock rate.
    pub playback_tick_hz: u32,
    /// Model filename inside the models directory.
    pub model_file: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            live_frame_interval: 4,
            playback_tick_interval: 3,
            playback_tick_hz: 30,
            model_file: "movenet-lightning.onnx".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingConfig
// ---------------------------------------------------------------------------

/// Output profile and recorder pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Target H.264 bitrate in kbit/s.
    pub bitrate_kbps: u32,
    /// Milliseconds between elapsed-time updates while recording.
    pub duration_tick_ms: u64,
    /// Frames that may wait for the encoder before new ones are dropped.
    pub encoder_queue_depth: usize,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            width: 720,
            height: 1280,
            fps: 30,
            bitrate_kbps: 2_500,
            duration_tick_ms: 100,
            encoder_queue_depth: 8,
        }
    }
}

impl RecordingConfig {
    pub fn profile(&self) -> OutputProfile {
        OutputProfile {
            width: self.width,
            height: self.height,
            fps: self.fps,
            bitrate_bps: self.bitrate_kbps.saturating_mul(1_000),
        }
    }

    pub fn recorder_settings(&self) -> RecorderSettings {
        RecorderSettings {
            profile: self.profile(),
            tick_interval: Duration::from_millis(self.duration_tick_ms.max(1)),
            queue_depth: self.encoder_queue_depth,
        }
    }
}

// ---------------------------------------------------------------------------
// PracticeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PracticeConfig {
    /// Throwing arm; selects which joints feed the angle.
    pub handedness: Handedness,
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use throw_coach::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub capture: CaptureConfig,
    pub inference: InferenceConfig,
    pub recording: RecordingConfig,
    pub practice: PracticeConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(
            original.capture.initial_position,
            loaded.capture.initial_position
        );
        assert_eq!(original.capture.frame_rate, loaded.capture.frame_rate);
        assert_eq!(
            original.inference.live_frame_interval,
            loaded.inference.live_frame_interval
        );
        assert_eq!(original.inference.model_file, loaded.inference.model_file);
        assert_eq!(original.recording.profile(), loaded.recording.profile());
        assert_eq!(
            original.recording.encoder_queue_depth,
            loaded.recording.encoder_queue_depth
        );
        assert_eq!(original.practice.handedness, loaded.practice.handedness);
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.inference.live_frame_interval, 4);
        assert_eq!(config.recording.width, 720);
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.capture.initial_position, CameraPosition::Back);
        assert_eq!(cfg.capture.frame_rate, 30);
        assert_eq!(cfg.inference.live_frame_interval, 4);
        assert_eq!(cfg.inference.playback_tick_interval, 3);
        assert_eq!(cfg.inference.playback_tick_hz, 30);
        assert_eq!(cfg.inference.model_file, "movenet-lightning.onnx");
        assert_eq!(cfg.recording.profile(), OutputProfile::default());
        assert_eq!(cfg.recording.bitrate_kbps, 2_500);
        assert_eq!(cfg.recording.duration_tick_ms, 100);
        assert_eq!(cfg.recording.encoder_queue_depth, 8);
        assert_eq!(cfg.practice.handedness, Handedness::Right);
    }

    #[test]
    fn recorder_settings_follow_recording_section() {
        let mut cfg = RecordingConfig::default();
        cfg.duration_tick_ms = 250;
        cfg.encoder_queue_depth = 3;

        let settings = cfg.recorder_settings();
        assert_eq!(settings.tick_interval, Duration::from_millis(250));
        assert_eq!(settings.queue_depth, 3);
        assert_eq!(settings.profile.height, 1280);
    }

    /// Verify that modified non-default values survive a round trip.
    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.capture.initial_position = CameraPosition::Front;
        cfg.inference.live_frame_interval = 6;
        cfg.inference.model_file = "movenet-thunder.onnx".into();
        cfg.recording.fps = 60;
        cfg.practice.handedness = Handedness::Left;

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.capture.initial_position, CameraPosition::Front);
        assert_eq!(loaded.inference.live_frame_interval, 6);
        assert_eq!(loaded.inference.model_file, "movenet-thunder.onnx");
        assert_eq!(loaded.recording.fps, 60);
        assert_eq!(loaded.practice.handedness, Handedness::Left);
    }

    /// Sections missing from the file fall back to their defaults.
    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[practice]\nhandedness = \"left\"\n").unwrap();

        let loaded = AppConfig::load_from(&path).expect("load");
        assert_eq!(loaded.practice.handedness, Handedness::Left);
        assert_eq!(loaded.recording.height, 1280);
        assert_eq!(loaded.inference.playback_tick_hz, 30);
    }
}

//! Persisted practice-session record.

use std::fmt;

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::video::ARTIFACT_EXTENSION;

/// `chrono` format of auto-generated titles, e.g. `Practice - Feb 5, 3:05 PM`.
pub const TITLE_FORMAT: &str = "Practice - %b %-d, %-I:%M %p";

/// Title shown for a session the user has not named.
pub fn default_title<Tz>(created_at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    created_at.format(TITLE_FORMAT).to_string()
}

/// Artifact filename for session `id`, relative to the data root.
pub fn artifact_filename(id: Uuid) -> String {
    format!("session_{id}.{ARTIFACT_EXTENSION}")
}

/// Sidecar holding the JPEG thumbnail of session `id`.
pub fn thumbnail_filename(id: Uuid) -> String {
    format!("session_{id}.jpg")
}

// ---------------------------------------------------------------------------
// RecordingSession
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub duration_secs: f64,
    /// Filename only; resolved against the store's data root.
    pub video_filename: String,
    pub throw_count: u32,
    /// Mean active-arm angle in degrees over samples taken while armed.
    pub average_angle: Option<f64>,
    pub best_accuracy: Option<f64>,
    pub notes: Option<String>,
    /// JPEG poster frame.  Lives in a sidecar file; the store loads it.
    #[serde(skip)]
    pub thumbnail: Option<Vec<u8>>,
    /// Sidecar filename, set by the store when a thumbnail is saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_filename: Option<String>,
    #[serde(default)]
    pub analyzed: bool,
    #[serde(default)]
    pub summary: Option<String>,
}

impl RecordingSession {
    /// A fresh record for artifact `video_filename`, titled from the local
    /// creation time.
    pub fn new(id: Uuid, created_at: DateTime<Utc>, video_filename: impl Into<String>) -> Self {
        Self {
            id,
            title: default_title(&created_at.with_timezone(&Local)),
            created_at,
            duration_secs: 0.0,
            video_filename: video_filename.into(),
            throw_count: 0,
            average_angle: None,
            best_accuracy: None,
            notes: None,
            thumbnail: None,
            thumbnail_filename: None,
            analyzed: false,
            summary: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AngleStats
// ---------------------------------------------------------------------------

/// Running sum and count of arm-angle samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AngleStats {
    sum: f64,
    count: u64,
}

impl AngleStats {
    pub fn record(&mut self, degrees: f32) {
        self.sum += f64::from(degrees);
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Arithmetic mean, or `None` when nothing was sampled.
    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

//! Joint-angle geometry.
//!
//! The angle at the elbow is measured between the upper arm (elbow →
//! shoulder) and the forearm (elbow → wrist):
//!
//! ```text
//!   cos(θ) = (v1 · v2) / (|v1| × |v2|)      v1 = shoulder − elbow
//!                                           v2 = wrist − elbow
//! ```
//!
//! The result is scale-invariant, so callers may pass normalised or pixel
//! coordinates as long as all three points share one space.

use serde::{Deserialize, Serialize};

/// A 2D point.  Pose joints use normalised `[0, 1]` coordinates with the
/// origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Map a normalised point into pixel space.
    pub fn to_pixel(self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }
}

/// Angle at `elbow` in degrees, in `[0, 180]`.
///
/// Returns `None` when the elbow coincides with the shoulder or the wrist,
/// since the angle is undefined for a zero-length segment.
///
/// ```
/// use throw_coach::geometry::{compute_angle, Point2};
///
/// let angle = compute_angle(
///     Point2::new(0.0, 0.0),
///     Point2::new(0.5, 0.0),
///     Point2::new(0.5, 0.5),
/// );
/// assert!((angle.unwrap() - 90.0).abs() < 1e-3);
/// ```
pub fn compute_angle(shoulder: Point2, elbow: Point2, wrist: Point2) -> Option<f32> {
    let v1 = (
        f64::from(shoulder.x - elbow.x),
        f64::from(shoulder.y - elbow.y),
    );
    let v2 = (f64::from(wrist.x - elbow.x), f64::from(wrist.y - elbow.y));

    let mag1 = (v1.0 * v1.0 + v1.1 * v1.1).sqrt();
    let mag2 = (v2.0 * v2.0 + v2.1 * v2.1).sqrt();
    if mag1 <= f64::EPSILON || mag2 <= f64::EPSILON {
        return None;
    }

    let dot = v1.0 * v2.0 + v1.1 * v2.1;
    let cos_angle = (dot / (mag1 * mag2)).clamp(-1.0, 1.0);
    Some(cos_angle.acos().to_degrees() as f32)
}

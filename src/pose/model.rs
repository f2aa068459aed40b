//! The per-frame pose model.
//!
//! A [`PoseModel`] is built fresh from each detector result and never
//! mutated afterwards.  Joints the detector was not confident about are
//! simply absent from the map; nothing is ever defaulted to a coordinate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::joint::{Joint, RawObservation};
use crate::geometry::{compute_angle, Point2};

/// A joint must beat this confidence to be kept.
pub const JOINT_CONFIDENCE_THRESHOLD: f32 = 0.3;

// ---------------------------------------------------------------------------
// Handedness
// ---------------------------------------------------------------------------

/// Which arm is throwing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handedness {
    Right,
    Left,
}

impl Handedness {
    /// Shoulder, elbow and wrist of the throwing arm.
    pub fn arm(self) -> [Joint; 3] {
        match self {
            Handedness::Right => [Joint::RightShoulder, Joint::RightElbow, Joint::RightWrist],
            Handedness::Left => [Joint::LeftShoulder, Joint::LeftElbow, Joint::LeftWrist],
        }
    }
}

impl Default for Handedness {
    fn default() -> Self {
        Handedness::Right
    }
}

// ---------------------------------------------------------------------------
// PoseModel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseModel {
    joints: BTreeMap<Joint, Point2>,
    confidence: f32,
}

impl PoseModel {
    /// Convert raw detector output into display space.
    ///
    /// Joints at or below [`JOINT_CONFIDENCE_THRESHOLD`] are dropped and the
    /// y axis is flipped from bottom-left to top-left origin.
    pub fn from_observation(observation: &RawObservation) -> Self {
        let joints = Joint::ALL
            .iter()
            .filter_map(|&joint| {
                let raw = observation.joint(joint)?;
                (raw.confidence > JOINT_CONFIDENCE_THRESHOLD)
                    .then(|| (joint, Point2::new(raw.x, 1.0 - raw.y)))
            })
            .collect();

        Self {
            joints,
            confidence: observation.confidence,
        }
    }

    /// Overall detection confidence, copied from the detector.
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn joint(&self, joint: Joint) -> Option<Point2> {
        self.joints.get(&joint).copied()
    }

    /// Present joints in identifier order.
    pub fn joints(&self) -> impl Iterator<Item = (Joint, Point2)> + '_ {
        self.joints.iter().map(|(&joint, &point)| (joint, point))
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Elbow angle of the throwing arm, in degrees.
    ///
    /// `None` when any of shoulder, elbow or wrist is missing, or when the
    /// geometry is degenerate.
    pub fn active_arm_angle(&self, handedness: Handedness) -> Option<f32> {
        let [shoulder, elbow, wrist] = handedness.arm();
        compute_angle(self.joint(shoulder)?, self.joint(elbow)?, self.joint(wrist)?)
    }
}

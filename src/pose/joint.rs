//! Joint identifiers and the raw detector output they index into.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The body landmarks a pose detector reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Joint {
    Nose,
    Neck,
    /// Hip centre.
    Root,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
}

impl Joint {
    /// Every joint, in the order pose models are built.
    pub const ALL: [Joint; 19] = [
        Joint::Nose,
        Joint::Neck,
        Joint::Root,
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftAnkle,
        Joint::RightAnkle,
        Joint::LeftEye,
        Joint::RightEye,
        Joint::LeftEar,
        Joint::RightEar,
    ];
}

/// One joint as reported by a detector, before filtering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawJoint {
    /// Normalised x, origin at the left edge.
    pub x: f32,
    /// Normalised y, origin at the **bottom** edge.
    pub y: f32,
    pub confidence: f32,
}

impl RawJoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }
}

/// A detector's answer for one frame: per-joint points in bottom-left-origin
/// normalised space plus an overall detection confidence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawObservation {
    pub confidence: f32,
    joints: HashMap<Joint, RawJoint>,
}

impl RawObservation {
    pub fn new(confidence: f32) -> Self {
        Self {
            confidence,
            joints: HashMap::new(),
        }
    }

    /// Builder-style insert.
    pub fn with_joint(mut self, joint: Joint, raw: RawJoint) -> Self {
        self.joints.insert(joint, raw);
        self
    }

    pub fn insert(&mut self, joint: Joint, raw: RawJoint) {
        self.joints.insert(joint, raw);
    }

    /// The detector's entry for `joint`, if it reported one at all.
    pub fn joint(&self, joint: Joint) -> Option<RawJoint> {
        self.joints.get(&joint).copied()
    }
}

//! Skeleton overlay geometry.
//!
//! The joint-pair table is pure data; renderers turn a [`PoseModel`] into
//! pixel-space line segments with [`overlay_segments`] and draw them however
//! they like.

use super::{Joint, PoseModel};

/// Bones drawn between joints.
pub const SKELETON_CONNECTIONS: [(Joint, Joint); 18] = [
    // Head
    (Joint::Nose, Joint::LeftEye),
    (Joint::Nose, Joint::RightEye),
    (Joint::LeftEye, Joint::LeftEar),
    (Joint::RightEye, Joint::RightEar),
    (Joint::Nose, Joint::Neck),
    // Torso
    (Joint::Neck, Joint::LeftShoulder),
    (Joint::Neck, Joint::RightShoulder),
    (Joint::Neck, Joint::Root),
    (Joint::Root, Joint::LeftHip),
    (Joint::Root, Joint::RightHip),
    // Arms
    (Joint::LeftShoulder, Joint::LeftElbow),
    (Joint::LeftElbow, Joint::LeftWrist),
    (Joint::RightShoulder, Joint::RightElbow),
    (Joint::RightElbow, Joint::RightWrist),
    // Legs
    (Joint::LeftHip, Joint::LeftKnee),
    (Joint::LeftKnee, Joint::LeftAnkle),
    (Joint::RightHip, Joint::RightKnee),
    (Joint::RightKnee, Joint::RightAnkle),
];

/// A bone in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub joints: (Joint, Joint),
    pub from: (f32, f32),
    pub to: (f32, f32),
}

/// Pixel-space bones for every connection whose two joints are present.
pub fn overlay_segments(pose: &PoseModel, width: u32, height: u32) -> Vec<Segment> {
    SKELETON_CONNECTIONS
        .iter()
        .filter_map(|&(a, b)| {
            let from = pose.joint(a)?.to_pixel(width, height);
            let to = pose.joint(b)?.to_pixel(width, height);
            Some(Segment {
                joints: (a, b),
                from,
                to,
            })
        })
        .collect()
}

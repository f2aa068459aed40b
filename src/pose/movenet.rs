//! MoveNet single-pose detector via ONNX Runtime.
//!
//! MoveNet reports 17 COCO keypoints as `(y, x, score)` with a top-left
//! origin.  They are converted into the detector contract: bottom-left
//! origin, with neck and root synthesised as shoulder and hip midpoints.

use std::path::Path;
use std::sync::Mutex;

use image::imageops::FilterType;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use crate::capture::Frame;

use super::{Joint, PoseDetector, PoseError, RawJoint, RawObservation};

/// Square input edge expected by MoveNet Lightning.
pub const MOVENET_INPUT_SIZE: u32 = 192;

/// COCO keypoint order as emitted by MoveNet.
const COCO_ORDER: [Joint; 17] = [
    Joint::Nose,
    Joint::LeftEye,
    Joint::RightEye,
    Joint::LeftEar,
    Joint::RightEar,
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
];

pub struct MoveNetDetector {
    // `Session::run` needs `&mut self`; the estimator never runs two
    // inferences at once, so this lock is uncontended.
    session: Mutex<Session>,
}

impl MoveNetDetector {
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self, PoseError> {
        let path = model_path.as_ref();
        if !path.exists() {
            return Err(PoseError::ModelNotFound(path.display().to_string()));
        }

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| PoseError::ModelLoad(e.to_string()))?;

        Ok(Self {
            session: Mutex::new(session),
        })
    }

    fn preprocess(frame: &Frame) -> Array4<f32> {
        let size = MOVENET_INPUT_SIZE;
        let resized = image::imageops::resize(&frame.to_image(), size, size, FilterType::Triangle);
        let mut tensor = Array4::<f32>::zeros((1, size as usize, size as usize, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, y as usize, x as usize, c]] = f32::from(pixel[c]);
            }
        }
        tensor
    }
}

impl PoseDetector for MoveNetDetector {
    fn detect(&self, frame: &Frame) -> Result<Option<RawObservation>, PoseError> {
        let input = Tensor::from_array(Self::preprocess(frame))
            .map_err(|e| PoseError::Inference(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| PoseError::Inference("session lock poisoned".into()))?;
        let outputs = session
            .run(ort::inputs!["serving_default_input_0" => input])
            .map_err(|e| PoseError::Inference(e.to_string()))?;

        // Output shape [1, 1, 17, 3] → (y, x, score)
        let output: ndarray::ArrayViewD<f32> = outputs["StatefulPartitionedCall_0"]
            .try_extract_array()
            .map_err(|e| PoseError::Inference(e.to_string()))?;

        let mut scores = Vec::with_capacity(COCO_ORDER.len());
        let mut observation = RawObservation::default();
        for (i, &joint) in COCO_ORDER.iter().enumerate() {
            let y = output[[0, 0, i, 0]];
            let x = output[[0, 0, i, 1]];
            let score = output[[0, 0, i, 2]];
            scores.push(score);
            observation.insert(joint, RawJoint::new(x, 1.0 - y, score));
        }

        synthesize_midpoint(&mut observation, Joint::Neck, Joint::LeftShoulder, Joint::RightShoulder);
        synthesize_midpoint(&mut observation, Joint::Root, Joint::LeftHip, Joint::RightHip);

        let confidence = scores.iter().sum::<f32>() / scores.len() as f32;
        if confidence < 0.1 {
            return Ok(None);
        }
        observation.confidence = confidence;
        Ok(Some(observation))
    }
}

fn synthesize_midpoint(obs: &mut RawObservation, target: Joint, a: Joint, b: Joint) {
    if let (Some(a), Some(b)) = (obs.joint(a), obs.joint(b)) {
        obs.insert(
            target,
            RawJoint::new(
                (a.x + b.x) / 2.0,
                (a.y + b.y) / 2.0,
                a.confidence.min(b.confidence),
            ),
        );
    }
}

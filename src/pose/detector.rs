//! Pose detector trait and implementations.
//!
//! [`PoseDetector`] is what the estimator calls on its blocking worker.  It
//! is object-safe and `Send + Sync` so it can be held behind an
//! `Arc<dyn PoseDetector>` and shared between the live and playback
//! estimators.
//!
//! [`NoModelDetector`] stands in when no model file is available: every
//! call fails, the estimator reports it, and the rest of the app keeps
//! working.

use crate::capture::Frame;

use super::joint::RawObservation;
use super::PoseError;

// ---------------------------------------------------------------------------
// PoseDetector trait
// ---------------------------------------------------------------------------

/// Single-person 2D pose detector.
///
/// # Contract
///
/// - Returns `Ok(None)` when no body is found in the frame.
/// - Returned points are normalised with the origin at the bottom-left.
pub trait PoseDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Option<RawObservation>, PoseError>;
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn PoseDetector>) {}
};

// ---------------------------------------------------------------------------
// NoModelDetector
// ---------------------------------------------------------------------------

/// Fallback detector used when the model file is missing.
#[derive(Debug, Clone)]
pub struct NoModelDetector {
    path: String,
}

impl NoModelDetector {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl PoseDetector for NoModelDetector {
    fn detect(&self, _frame: &Frame) -> Result<Option<RawObservation>, PoseError> {
        Err(PoseError::ModelNotFound(self.path.clone()))
    }
}

// ---------------------------------------------------------------------------
// MockPoseDetector  (test-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::{MockOutcome, MockPoseDetector};

#[cfg(test)]
mod mock {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::pose::joint::{Joint, RawJoint};

    #[derive(Debug, Clone, Copy)]
    pub enum MockOutcome {
        /// A right arm bent at 90°.
        Body,
        NoBody,
        Fail,
    }

    /// Test double that sleeps for `latency` and returns a canned outcome,
    /// recording which frames it saw and how many calls overlapped.
    pub struct MockPoseDetector {
        outcome: Mutex<MockOutcome>,
        latency: Duration,
        active: AtomicUsize,
        max_active: AtomicUsize,
        seen: Mutex<Vec<Duration>>,
    }

    impl MockPoseDetector {
        pub fn new(outcome: MockOutcome, latency: Duration) -> Self {
            Self {
                outcome: Mutex::new(outcome),
                latency,
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn set_outcome(&self, outcome: MockOutcome) {
            *self.outcome.lock().unwrap() = outcome;
        }

        /// Highest number of `detect` calls that ran at the same time.
        pub fn max_concurrent(&self) -> usize {
            self.max_active.load(Ordering::SeqCst)
        }

        /// Timestamps of every frame passed to `detect`, in call order.
        pub fn seen(&self) -> Vec<Duration> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl PoseDetector for MockPoseDetector {
        fn detect(&self, frame: &Frame) -> Result<Option<RawObservation>, PoseError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.seen.lock().unwrap().push(frame.pts());

            std::thread::sleep(self.latency);
            let outcome = *self.outcome.lock().unwrap();
            self.active.fetch_sub(1, Ordering::SeqCst);

            match outcome {
                MockOutcome::Body => Ok(Some(
                    RawObservation::new(0.9)
                        .with_joint(Joint::RightShoulder, RawJoint::new(0.4, 0.8, 0.9))
                        .with_joint(Joint::RightElbow, RawJoint::new(0.4, 0.6, 0.9))
                        .with_joint(Joint::RightWrist, RawJoint::new(0.6, 0.6, 0.9)),
                )),
                MockOutcome::NoBody => Ok(None),
                MockOutcome::Fail => Err(PoseError::Inference("mock failure".into())),
            }
        }
    }
}

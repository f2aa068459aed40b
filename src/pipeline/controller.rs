//! Practice controller: turns pipeline events into saved sessions.
//!
//! ```text
//!                   ┌──────────── LivePipeline ────────────┐
//!  CameraBackend ─▶ FrameSource ─┬─▶ PoseEstimator (Live) ──┐
//!                                └─▶ Recorder ──────────────┤ PipelineEvent
//!                                                           ▼
//!                                               PracticeController::handle_event
//!                                                 ├─ PoseUpdated   → angle sample (frame inside the recording window)
//!                                                 ├─ RecordingFinished → thumbnail + insert
//!                                                 └─ RecordingFailed   → nothing persisted
//! ```
//!
//! The controller runs on the observer task; it is the only place that
//! writes to the session store during a live session.  Angle samples are
//! matched to the recording by capture timestamp, not by when the pose
//! event is handled, so poses still queued from before `arm` are left out
//! and poses of the last armed frames still count after `disarm`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use uuid::Uuid;

use crate::capture::{CameraBackend, CameraPosition, CaptureError, FrameSink, FrameSource};
use crate::config::AppConfig;
use crate::pose::{EstimatorConfig, Handedness, PoseDetector, PoseEstimator, PoseModel};
use crate::recorder::{
    generate_thumbnail, EncoderFactory, Recorder, RecorderError, RecorderState,
};
use crate::session::{artifact_filename, AngleStats, RecordingSession, SessionStore};

use super::events::{EventSender, PipelineEvent, PoseSource, RecordingOutcome};

// ---------------------------------------------------------------------------
// LivePipeline
// ---------------------------------------------------------------------------

/// Frame source wired to a live pose estimator and a recorder.
pub struct LivePipeline {
    source: FrameSource,
    estimator: Arc<PoseEstimator>,
    recorder: Arc<Recorder>,
}

impl LivePipeline {
    /// Register `estimator` and `recorder` as sinks of `source`.
    pub fn new(
        source: FrameSource,
        estimator: Arc<PoseEstimator>,
        recorder: Arc<Recorder>,
    ) -> Self {
        let pose_sink: Arc<dyn FrameSink> = estimator.clone();
        let record_sink: Arc<dyn FrameSink> = recorder.clone();
        source.add_sink(&pose_sink);
        source.add_sink(&record_sink);
        Self {
            source,
            estimator,
            recorder,
        }
    }

    /// Build every stage from `config`.
    pub fn from_config(
        config: &AppConfig,
        camera: Arc<dyn CameraBackend>,
        detector: Arc<dyn PoseDetector>,
        encoders: Arc<dyn EncoderFactory>,
        runtime: Handle,
        events: EventSender,
    ) -> Self {
        let source = FrameSource::new(camera, config.capture.initial_position);
        let estimator = Arc::new(PoseEstimator::new(
            detector,
            runtime.clone(),
            events.clone(),
            EstimatorConfig::live(config.inference.live_frame_interval),
        ));
        let recorder = Arc::new(Recorder::new(
            encoders,
            runtime,
            events,
            config.recording.recorder_settings(),
        ));
        Self::new(source, estimator, recorder)
    }

    pub fn start(&self) -> Result<(), CaptureError> {
        self.source.start()
    }

    /// Disarm any recording, then release the camera.
    pub fn stop(&self) {
        self.recorder.disarm();
        self.source.stop();
    }

    pub fn switch_camera(&self) -> CameraPosition {
        self.source.switch_device()
    }

    pub fn source(&self) -> &FrameSource {
        &self.source
    }

    pub fn estimator(&self) -> &Arc<PoseEstimator> {
        &self.estimator
    }

    pub fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }
}

impl Drop for LivePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// PracticeController
// ---------------------------------------------------------------------------

/// What a handled event meant for the caller.
#[derive(Debug)]
pub enum PracticeUpdate {
    /// Nothing user-visible changed.
    Ignored,
    Pose {
        source: PoseSource,
        pose: Option<PoseModel>,
        angle: Option<f32>,
    },
    Elapsed(f64),
    InferenceFailed(String),
    Saved(RecordingSession),
    Failed(String),
}

struct PendingSession {
    id: Uuid,
    created_at: DateTime<Utc>,
}

pub struct PracticeController {
    store: Arc<SessionStore>,
    recorder: Arc<Recorder>,
    handedness: Handedness,
    angles: AngleStats,
    throws: u32,
    pending: Option<PendingSession>,
}

impl PracticeController {
    pub fn new(store: Arc<SessionStore>, recorder: Arc<Recorder>, handedness: Handedness) -> Self {
        Self {
            store,
            recorder,
            handedness,
            angles: AngleStats::default(),
            throws: 0,
            pending: None,
        }
    }

    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    pub fn set_handedness(&mut self, handedness: Handedness) {
        self.handedness = handedness;
    }

    pub fn angle_samples(&self) -> u64 {
        self.angles.count()
    }

    pub fn throw_count(&self) -> u32 {
        self.throws
    }

    /// Arm the recorder for a new session stored under the data root.
    ///
    /// Refused until the previous recording's outcome has been handled, so
    /// its metrics cannot be overwritten by the next session.
    pub fn start_recording(&mut self) -> Result<PathBuf, RecorderError> {
        if self.pending.is_some() {
            let state = match self.recorder.state() {
                RecorderState::Idle => RecorderState::Finalizing,
                busy => busy,
            };
            return Err(RecorderError::AlreadyActive(state));
        }

        let id = Uuid::new_v4();
        let path = self.store.root().join(artifact_filename(id));
        self.recorder.arm(&path)?;

        self.angles.reset();
        self.throws = 0;
        self.pending = Some(PendingSession {
            id,
            created_at: Utc::now(),
        });
        log::info!("practice: session {id} started");
        Ok(path)
    }

    /// Disarm; the session is saved when `RecordingFinished` arrives.
    pub fn stop_recording(&mut self) -> bool {
        self.recorder.disarm()
    }

    /// Count one throw in the session being recorded.
    pub fn record_throw(&mut self) {
        if self.recorder.is_armed() {
            self.throws += 1;
        }
    }

    pub async fn handle_event(&mut self, event: PipelineEvent) -> PracticeUpdate {
        match event {
            PipelineEvent::PoseUpdated {
                source,
                pose,
                frame_pts,
            } => {
                let angle = pose
                    .as_ref()
                    .and_then(|p| p.active_arm_angle(self.handedness));
                if let (PoseSource::Live, Some(degrees)) = (source, angle) {
                    if self.captured_while_recording(frame_pts) {
                        self.angles.record(degrees);
                    }
                }
                PracticeUpdate::Pose {
                    source,
                    pose,
                    angle,
                }
            }
            PipelineEvent::InferenceFailed { message, .. } => {
                PracticeUpdate::InferenceFailed(message)
            }
            PipelineEvent::DurationUpdated { seconds } => PracticeUpdate::Elapsed(seconds),
            PipelineEvent::RecordingFinished(outcome) => self.save(outcome).await,
            PipelineEvent::RecordingFailed { message } => {
                self.pending = None;
                log::warn!("practice: recording failed, nothing saved: {message}");
                PracticeUpdate::Failed(message)
            }
        }
    }

    fn captured_while_recording(&self, frame_pts: Duration) -> bool {
        self.pending.is_some()
            && self
                .recorder
                .recording_window()
                .is_some_and(|window| window.contains(frame_pts))
    }

    async fn save(&mut self, outcome: RecordingOutcome) -> PracticeUpdate {
        let Some(pending) = self.pending.take() else {
            log::warn!(
                "practice: finished recording {} has no session",
                outcome.path.display()
            );
            return PracticeUpdate::Ignored;
        };

        let filename = outcome
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| artifact_filename(pending.id));

        let mut session = RecordingSession::new(pending.id, pending.created_at, filename);
        session.duration_secs = outcome.duration.as_secs_f64();
        session.throw_count = self.throws;
        session.average_angle = self.angles.average();
        session.thumbnail = generate_thumbnail(outcome.path.clone()).await;

        if let Err(e) = self.store.insert(session.clone()) {
            log::error!("practice: could not save session {}: {e}", session.id);
            if let Err(e) = std::fs::remove_file(&outcome.path) {
                log::warn!("practice: could not remove {}: {e}", outcome.path.display());
            }
            return PracticeUpdate::Failed(e.to_string());
        }
        // The stored copy carries the thumbnail sidecar name.
        let saved = self.store.get(session.id).unwrap_or(session);
        PracticeUpdate::Saved(saved)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use crate::capture::TestPatternCamera;
    use crate::pipeline::events::{event_channel, EventReceiver};
    use crate::pose::detector::{MockOutcome, MockPoseDetector};
    use crate::pose::{Joint, RawJoint, RawObservation};
    use crate::recorder::encoder::MockEncoderFactory;
    use crate::recorder::{H264EncoderFactory, RecorderSettings};
    use crate::session::{thumbnail_filename, INDEX_FILE};
    use crate::video::OutputProfile;

    /// Right arm bent at `degrees`, in detector (bottom-left) space.
    fn pose_with_angle(degrees: f32) -> PoseModel {
        let rad = degrees.to_radians();
        let obs = RawObservation::new(0.9)
            .with_joint(Joint::RightShoulder, RawJoint::new(0.5, 0.7, 0.9))
            .with_joint(Joint::RightElbow, RawJoint::new(0.5, 0.5, 0.9))
            .with_joint(
                Joint::RightWrist,
                RawJoint::new(0.5 + 0.2 * rad.sin(), 0.5 + 0.2 * rad.cos(), 0.9),
            );
        PoseModel::from_observation(&obs)
    }

    fn live_pose(pose: PoseModel, captured_ms: u64) -> PipelineEvent {
        PipelineEvent::PoseUpdated {
            source: PoseSource::Live,
            pose: Some(pose),
            frame_pts: Duration::from_millis(captured_ms),
        }
    }

    fn controller(
        factory: Arc<dyn EncoderFactory>,
    ) -> (PracticeController, EventReceiver, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::open(dir.path()).unwrap());
        let (tx, rx) = event_channel();
        let settings = RecorderSettings {
            profile: OutputProfile {
                width: 32,
                height: 32,
                fps: 30,
                bitrate_bps: 500_000,
            },
            ..Default::default()
        };
        let recorder = Arc::new(Recorder::new(factory, Handle::current(), tx, settings));
        (
            PracticeController::new(store, recorder, Handedness::Right),
            rx,
            dir,
        )
    }

    async fn drive_until_resolved(
        controller: &mut PracticeController,
        rx: &mut EventReceiver,
    ) -> PracticeUpdate {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out")
                .expect("channel closed");
            match controller.handle_event(event).await {
                update @ (PracticeUpdate::Saved(_) | PracticeUpdate::Failed(_)) => return update,
                _ => continue,
            }
        }
    }

    async fn until_idle(recorder: &Recorder) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while recorder.state() != RecorderState::Idle {
            assert!(tokio::time::Instant::now() < deadline, "recorder never went idle");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn frame_at(ms: u64) -> crate::capture::Frame {
        crate::capture::Frame::from_rgb(8, 8, vec![120; 192], Duration::from_millis(ms)).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn finished_recording_is_saved_with_average_angle() {
        let (mut ctl, mut rx, _dir) = controller(Arc::new(H264EncoderFactory));

        // Samples before arming are ignored.
        ctl.handle_event(live_pose(pose_with_angle(170.0), 500)).await;

        let path = ctl.start_recording().unwrap();
        ctl.recorder.submit_frame(&frame_at(1_000));
        for (degrees, ms) in [(80.0, 1_000), (90.0, 2_000), (100.0, 3_000)] {
            ctl.handle_event(live_pose(pose_with_angle(degrees), ms)).await;
        }
        ctl.record_throw();
        ctl.record_throw();
        ctl.recorder.submit_frame(&frame_at(3_500));
        assert!(ctl.stop_recording());

        // A late pose of an armed frame still counts; a later frame does not.
        ctl.handle_event(live_pose(pose_with_angle(90.0), 3_500)).await;
        ctl.handle_event(live_pose(pose_with_angle(10.0), 3_600)).await;

        let session = match drive_until_resolved(&mut ctl, &mut rx).await {
            PracticeUpdate::Saved(session) => session,
            other => panic!("unexpected update {other:?}"),
        };
        assert_eq!(ctl.angle_samples(), 4);
        assert!((session.average_angle.unwrap() - 90.0).abs() < 1e-3);
        assert_eq!(session.throw_count, 2);
        assert!((session.duration_secs - 2.5).abs() < 1e-9);
        assert!(session.thumbnail.is_some());
        assert_eq!(
            session.thumbnail_filename,
            Some(thumbnail_filename(session.id))
        );
        assert!(session.title.starts_with("Practice - "));
        assert_eq!(ctl.store.artifact_path(&session), path);
        assert_eq!(ctl.store.get(session.id), Some(session));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn no_samples_saves_absent_average() {
        let (mut ctl, mut rx, _dir) = controller(Arc::new(MockEncoderFactory::default()));

        ctl.start_recording().unwrap();
        ctl.recorder.submit_frame(&frame_at(0));
        ctl.stop_recording();

        match drive_until_resolved(&mut ctl, &mut rx).await {
            PracticeUpdate::Saved(session) => {
                assert_eq!(session.average_angle, None);
                // Mock encoders write no file, so there is nothing to thumbnail.
                assert!(session.thumbnail.is_none());
            }
            other => panic!("unexpected update {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_recording_persists_nothing() {
        let factory = MockEncoderFactory {
            fail_finish: true,
            ..Default::default()
        };
        let (mut ctl, mut rx, _dir) = controller(Arc::new(factory));

        ctl.start_recording().unwrap();
        ctl.recorder.submit_frame(&frame_at(0));
        ctl.handle_event(live_pose(pose_with_angle(45.0), 0)).await;
        ctl.stop_recording();

        assert!(matches!(
            drive_until_resolved(&mut ctl, &mut rx).await,
            PracticeUpdate::Failed(_)
        ));
        assert!(ctl.store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn throws_only_count_while_recording() {
        let (mut ctl, _rx, _dir) = controller(Arc::new(MockEncoderFactory::default()));
        ctl.record_throw();
        assert_eq!(ctl.throw_count(), 0);

        ctl.start_recording().unwrap();
        ctl.record_throw();
        assert_eq!(ctl.throw_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn left_handed_ignores_right_arm() {
        let (mut ctl, _rx, _dir) = controller(Arc::new(MockEncoderFactory::default()));
        ctl.set_handedness(Handedness::Left);
        ctl.start_recording().unwrap();

        ctl.recorder.submit_frame(&frame_at(0));

        match ctl.handle_event(live_pose(pose_with_angle(90.0), 0)).await {
            PracticeUpdate::Pose { angle, .. } => assert!(angle.is_none()),
            other => panic!("unexpected update {other:?}"),
        }
        assert_eq!(ctl.angle_samples(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn live_pipeline_records_test_pattern_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::open(dir.path()).unwrap());
        let (tx, mut rx) = event_channel();

        let mut config = AppConfig::default();
        config.recording.width = 16;
        config.recording.height = 32;
        config.recording.encoder_queue_depth = 64;

        let pipeline = LivePipeline::from_config(
            &config,
            Arc::new(TestPatternCamera::new(32, 16, 60)),
            Arc::new(MockPoseDetector::new(MockOutcome::Body, Duration::ZERO)),
            Arc::new(H264EncoderFactory),
            Handle::current(),
            tx,
        );
        let mut ctl = PracticeController::new(
            Arc::clone(&store),
            Arc::clone(pipeline.recorder()),
            Handedness::Right,
        );

        pipeline.start().unwrap();
        ctl.start_recording().unwrap();

        // Observe while armed so pose samples count toward the average.
        let deadline = tokio::time::Instant::now() + Duration::from_millis(300);
        while let Ok(Some(event)) = tokio::time::timeout_at(deadline, rx.recv()).await {
            ctl.handle_event(event).await;
        }
        ctl.stop_recording();

        let session = match drive_until_resolved(&mut ctl, &mut rx).await {
            PracticeUpdate::Saved(session) => session,
            other => panic!("unexpected update {other:?}"),
        };
        pipeline.stop();

        assert!(session.duration_secs > 0.0);
        assert!(session.thumbnail.is_some());
        // The mock detector always reports a right angle.
        assert!((session.average_angle.unwrap() - 90.0).abs() < 1e-3);
        assert!(store.artifact_path(&session).exists());
        assert_eq!(store.list().len(), 1);
        assert!(!pipeline.source().is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn poses_from_frames_before_the_first_recorded_frame_are_ignored() {
        let (mut ctl, _rx, _dir) = controller(Arc::new(MockEncoderFactory::default()));

        ctl.start_recording().unwrap();
        ctl.recorder.submit_frame(&frame_at(2_000));

        // Captured before arming, handled after.
        ctl.handle_event(live_pose(pose_with_angle(120.0), 500)).await;
        assert_eq!(ctl.angle_samples(), 0);

        ctl.handle_event(live_pose(pose_with_angle(120.0), 2_000)).await;
        assert_eq!(ctl.angle_samples(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cannot_start_again_until_outcome_is_handled() {
        let (mut ctl, mut rx, _dir) = controller(Arc::new(MockEncoderFactory::default()));

        let first = ctl.start_recording().unwrap();
        ctl.recorder.submit_frame(&frame_at(0));
        ctl.recorder.submit_frame(&frame_at(1_000));
        ctl.record_throw();
        ctl.stop_recording();
        until_idle(&ctl.recorder).await;

        // Recorder is idle, but the first session has not been saved yet.
        assert!(matches!(
            ctl.start_recording(),
            Err(RecorderError::AlreadyActive(_))
        ));

        let saved = match drive_until_resolved(&mut ctl, &mut rx).await {
            PracticeUpdate::Saved(session) => session,
            other => panic!("unexpected update {other:?}"),
        };
        assert_eq!(ctl.store.artifact_path(&saved), first);
        assert_eq!(saved.throw_count, 1);
        assert!((saved.duration_secs - 1.0).abs() < 1e-9);

        let second = ctl.start_recording().unwrap();
        assert_ne!(second, first);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unsaved_recording_leaves_no_artifact() {
        let (mut ctl, mut rx, dir) = controller(Arc::new(H264EncoderFactory));
        // The index rewrite fails once its path is a directory.
        std::fs::create_dir(dir.path().join(INDEX_FILE)).unwrap();

        let path = ctl.start_recording().unwrap();
        ctl.recorder.submit_frame(&frame_at(0));
        ctl.recorder.submit_frame(&frame_at(500));
        ctl.stop_recording();

        assert!(matches!(
            drive_until_resolved(&mut ctl, &mut rx).await,
            PracticeUpdate::Failed(_)
        ));
        assert!(!path.exists());
        assert!(ctl.store.is_empty());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".mp4") || name.ends_with(".jpg"))
            .collect();
        assert!(leftovers.is_empty(), "orphaned files: {leftovers:?}");
    }
}

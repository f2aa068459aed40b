//! Application entry point for throw-coach.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime (multi-thread).
//! 4. Open the session store under the data directory.
//! 5. Pick the pose detector (MoveNet when compiled in and the model file
//!    exists, otherwise a stub that fails every inference).
//! 6. Pick the camera backend (webcam when compiled in, otherwise a test
//!    pattern).
//! 7. Run the requested command.
//!
//! # Commands
//!
//! ```text
//! throw-coach                 record until Ctrl-C, then save the session
//! throw-coach list            list saved sessions, newest first
//! throw-coach review <id>     replay a session through the pose estimator
//! throw-coach delete <id>     delete a session and its video
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::runtime::Runtime;
use uuid::Uuid;

use throw_coach::{
    capture::CameraBackend,
    config::{AppConfig, AppPaths},
    pipeline::{event_channel, LivePipeline, PipelineEvent, PracticeController, PracticeUpdate},
    playback::{Mp4PlaybackDecoder, PlaybackSampler, RealtimeClock},
    pose::{EstimatorConfig, NoModelDetector, PoseDetector, PoseEstimator},
    recorder::H264EncoderFactory,
    session::{summarize_and_store, AngleStats, MetricsSummarizer, SessionStore},
};

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

fn build_detector(model_path: &Path) -> Arc<dyn PoseDetector> {
    #[cfg(feature = "onnx")]
    {
        match throw_coach::pose::MoveNetDetector::load(model_path) {
            Ok(detector) => {
                log::info!("Pose model loaded: {}", model_path.display());
                return Arc::new(detector);
            }
            Err(e) => log::warn!("Could not load pose model: {e}"),
        }
    }

    log::warn!(
        "No pose model at {}; pose overlay disabled",
        model_path.display()
    );
    Arc::new(NoModelDetector::new(model_path.display().to_string()))
}

#[cfg(feature = "webcam")]
fn build_camera(_config: &AppConfig) -> Arc<dyn CameraBackend> {
    Arc::new(throw_coach::capture::WebcamBackend::new())
}

#[cfg(not(feature = "webcam"))]
fn build_camera(config: &AppConfig) -> Arc<dyn CameraBackend> {
    log::info!("Built without webcam support; using a test pattern");
    Arc::new(throw_coach::capture::TestPatternCamera::new(
        1280,
        720,
        config.capture.frame_rate,
    ))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn record(
    rt: &Runtime,
    config: &AppConfig,
    paths: &AppPaths,
    store: Arc<SessionStore>,
) -> Result<()> {
    let (events, mut event_rx) = event_channel();
    let pipeline = LivePipeline::from_config(
        config,
        build_camera(config),
        build_detector(&paths.model_path(&config.inference)),
        Arc::new(H264EncoderFactory),
        rt.handle().clone(),
        events,
    );
    let mut controller = PracticeController::new(
        Arc::clone(&store),
        Arc::clone(pipeline.recorder()),
        config.practice.handedness,
    );

    pipeline.start().context("failed to start capture")?;
    let artifact = controller
        .start_recording()
        .context("failed to start recording")?;
    log::info!("Recording to {} (Ctrl-C to stop)", artifact.display());

    let saved = rt.block_on(async {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                Some(event) = event_rx.recv() => {
                    if let PracticeUpdate::Elapsed(seconds) = controller.handle_event(event).await {
                        log::debug!("Recording {seconds:.1}s");
                    }
                }
            }
        }

        controller.stop_recording();
        while let Some(event) = event_rx.recv().await {
            match controller.handle_event(event).await {
                PracticeUpdate::Saved(session) => return Ok(session),
                PracticeUpdate::Failed(message) => bail!("recording failed: {message}"),
                _ => {}
            }
        }
        bail!("pipeline closed before the recording finished")
    });
    pipeline.stop();
    let session = saved?;

    let summary = rt
        .block_on(summarize_and_store(&store, &MetricsSummarizer, session.id))
        .unwrap_or_else(|e| {
            log::warn!("Summary unavailable: {e}");
            String::new()
        });
    log::info!("Saved \"{}\" ({}) {summary}", session.title, session.id);
    Ok(())
}

fn list(store: &SessionStore) {
    for session in store.list() {
        let angle = session
            .average_angle
            .map(|a| format!("{a:.0}°"))
            .unwrap_or_else(|| "-".into());
        println!(
            "{}  {:<32} {:>6.1}s  throws {:>3}  angle {:>5}",
            session.id, session.title, session.duration_secs, session.throw_count, angle
        );
    }
}

fn review(
    rt: &Runtime,
    config: &AppConfig,
    paths: &AppPaths,
    store: &SessionStore,
    id: Uuid,
) -> Result<()> {
    let session = store
        .get(id)
        .with_context(|| format!("no session with id {id}"))?;
    let decoder = Mp4PlaybackDecoder::open(store.artifact_path(&session))
        .context("failed to open session video")?;
    let length = decoder.duration();

    let (events, mut event_rx) = event_channel();
    let estimator = Arc::new(PoseEstimator::new(
        build_detector(&paths.model_path(&config.inference)),
        rt.handle().clone(),
        events,
        EstimatorConfig::playback(),
    ));
    let sampler = Arc::new(PlaybackSampler::new(
        Box::new(decoder),
        estimator,
        config.inference.playback_tick_interval,
    ));

    let clock = Arc::new(RealtimeClock::start(length));
    let mut ticker = sampler.spawn_clock(
        rt.handle(),
        clock.clone(),
        config.inference.playback_tick_hz,
    );
    log::info!("Reviewing \"{}\" ({:.1}s)", session.title, length.as_secs_f64());

    let handedness = config.practice.handedness;
    let stats = rt.block_on(async {
        let mut stats = AngleStats::default();
        while !clock.is_finished() {
            let next = tokio::time::timeout(Duration::from_millis(100), event_rx.recv()).await;
            if let Ok(Some(PipelineEvent::PoseUpdated { pose: Some(pose), frame_pts, .. })) = next {
                if let Some(angle) = pose.active_arm_angle(handedness) {
                    log::info!("{:>6.2}s  elbow {angle:.0}°", frame_pts.as_secs_f64());
                    stats.record(angle);
                }
            }
        }
        stats
    });
    ticker.stop();

    match stats.average() {
        Some(average) => log::info!("Review average {average:.0}° over {} samples", stats.count()),
        None => log::info!("No arm angle found during review"),
    }
    Ok(())
}

fn parse_id(arg: Option<String>) -> Result<Uuid> {
    let raw = arg.context("missing session id")?;
    Uuid::parse_str(&raw).with_context(|| format!("invalid session id {raw:?}"))
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("throw-coach starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    let paths = AppPaths::new();

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4. Session store
    let store = Arc::new(
        SessionStore::open(&paths.data_dir)
            .with_context(|| format!("failed to open {}", paths.data_dir.display()))?,
    );

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None | Some("record") => record(&rt, &config, &paths, store),
        Some("list") => {
            list(&store);
            Ok(())
        }
        Some("review") => review(&rt, &config, &paths, &store, parse_id(args.next())?),
        Some("delete") => {
            let id = parse_id(args.next())?;
            store.delete(id)?;
            log::info!("Deleted session {id}");
            Ok(())
        }
        Some(other) => bail!("unknown command {other:?} (expected record, list, review or delete)"),
    }
}

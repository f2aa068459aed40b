//! Recorder: owns the encoder for one recording at a time.
//!
//! ```text
//!  frame-delivery thread               video-encoder thread
//!  ─────────────────────               ────────────────────
//!  submit_frame(frame)
//!    ├─ not Armed          → ignored
//!    ├─ try_send(job) full → dropped (counted)
//!    └─ try_send(job) ok   ──────────▶ encoder.append(frame, pts)
//!
//!  disarm()                            channel closed
//!    Armed → Finalizing                  └─ encoder.finish()
//!    final DurationUpdated                    RecordingFinished / RecordingFailed
//!    drop sender ────────────────────▶        state = Idle
//! ```
//!
//! Capture never waits on the encoder: a full queue means the encoder is
//! not ready and the frame is dropped.  Encoder timestamps are relative to
//! the first accepted frame, so the reported duration is
//! `last_pts - first_pts`.  While armed, a tokio interval publishes the
//! elapsed time at roughly 10 Hz.
//!
//! The completion event is queued before the state returns to `Idle`, so an
//! observer that sees `Idle` can rely on the outcome already being in the
//! channel.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::capture::{Frame, FrameSink};
use crate::pipeline::events::{
    deliver_blocking, deliver_lossy, EventSender, PipelineEvent, RecordingOutcome,
};
use crate::video::{OutputProfile, VideoError};

use super::encoder::{EncoderFactory, VideoEncoder};
use super::{RecorderError, RecorderState};

// ---------------------------------------------------------------------------
// RecorderSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderSettings {
    pub profile: OutputProfile,
    /// Period of `DurationUpdated` events while armed.
    pub tick_interval: Duration,
    /// Frames that may wait for the encoder before new ones are dropped.
    pub queue_depth: usize,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            profile: OutputProfile::default(),
            tick_interval: Duration::from_millis(100),
            queue_depth: 8,
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingWindow
// ---------------------------------------------------------------------------

/// Capture timestamps spanned by the current or most recent recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingWindow {
    /// Device pts of the first accepted frame.
    pub first: Duration,
    /// Device pts of the latest accepted frame.
    pub last: Duration,
    /// Set on disarm; `last` is final from then on.
    pub closed: bool,
}

impl RecordingWindow {
    /// Whether a frame captured at `pts` belongs to the recording.
    pub fn contains(&self, pts: Duration) -> bool {
        pts >= self.first && (!self.closed || pts <= self.last)
    }
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

struct EncodeJob {
    frame: Frame,
    pts: Duration,
}

/// Counters shared between the submitting side, the ticker and the
/// encoder thread for one recording.
#[derive(Default)]
struct RecordingStats {
    elapsed_micros: AtomicU64,
    dropped: AtomicU64,
}

impl RecordingStats {
    fn elapsed(&self) -> Duration {
        Duration::from_micros(self.elapsed_micros.load(Ordering::Acquire))
    }
}

struct ActiveRecording {
    jobs: SyncSender<EncodeJob>,
    origin: Option<Duration>,
    stats: Arc<RecordingStats>,
    ticker: JoinHandle<()>,
}

struct Inner {
    state: RecorderState,
    active: Option<ActiveRecording>,
    window: Option<RecordingWindow>,
}

type SharedInner = Arc<Mutex<Inner>>;

fn lock(inner: &Mutex<Inner>) -> std::sync::MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

pub struct Recorder {
    factory: Arc<dyn EncoderFactory>,
    runtime: Handle,
    events: EventSender,
    settings: RecorderSettings,
    inner: SharedInner,
}

impl Recorder {
    /// * `factory`  - allocates one encoder per recording.
    /// * `runtime`  - runtime that hosts the duration ticker.
    /// * `events`   - channel drained by the observer.
    pub fn new(
        factory: Arc<dyn EncoderFactory>,
        runtime: Handle,
        events: EventSender,
        settings: RecorderSettings,
    ) -> Self {
        Self {
            factory,
            runtime,
            events,
            settings,
            inner: Arc::new(Mutex::new(Inner {
                state: RecorderState::Idle,
                active: None,
                window: None,
            })),
        }
    }

    pub fn state(&self) -> RecorderState {
        lock(&self.inner).state
    }

    pub fn is_armed(&self) -> bool {
        self.state().accepts_frames()
    }

    pub fn settings(&self) -> RecorderSettings {
        self.settings
    }

    /// Span of the current recording, or of the last one until the next
    /// `arm`.  `None` until a frame has been accepted.
    pub fn recording_window(&self) -> Option<RecordingWindow> {
        lock(&self.inner).window
    }

    /// Allocate an encoder for `output` and start accepting frames.
    ///
    /// Fails without changing state if a recording is armed or still
    /// finalizing, if the destination cannot be created, or if the encoder
    /// cannot be set up.
    pub fn arm(&self, output: &Path) -> Result<(), RecorderError> {
        let mut inner = lock(&self.inner);
        if inner.state.is_busy() {
            return Err(RecorderError::AlreadyActive(inner.state));
        }

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| RecorderError::InvalidOutputPath {
                path: output.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let encoder = self.factory.create(output, self.settings.profile)?;
        let (jobs, queue) = sync_channel(self.settings.queue_depth.max(1));
        let stats = Arc::new(RecordingStats::default());

        let worker = EncoderWorker {
            encoder,
            output: output.to_path_buf(),
            stats: Arc::clone(&stats),
            inner: Arc::clone(&self.inner),
            events: self.events.clone(),
        };
        thread::Builder::new()
            .name("video-encoder".into())
            .spawn(move || worker.run(queue))
            .map_err(|e| RecorderError::EncoderInit(e.to_string()))?;

        let ticker = self.runtime.spawn(report_elapsed(
            self.events.clone(),
            Arc::clone(&stats),
            self.settings.tick_interval,
        ));

        inner.state = RecorderState::Armed;
        inner.window = None;
        inner.active = Some(ActiveRecording {
            jobs,
            origin: None,
            stats,
            ticker,
        });
        log::info!("recorder: armed → {}", output.display());
        Ok(())
    }

    /// Offer a frame.  Returns `true` when the frame was queued for
    /// encoding.  Never blocks.
    pub fn submit_frame(&self, frame: &Frame) -> bool {
        let mut guard = lock(&self.inner);
        let inner = &mut *guard;
        if !inner.state.accepts_frames() {
            return false;
        }
        let Some(active) = inner.active.as_mut() else {
            return false;
        };

        let origin = active.origin.unwrap_or(frame.pts());
        let pts = frame.pts().saturating_sub(origin);
        let job = EncodeJob {
            frame: frame.clone(),
            pts,
        };

        match active.jobs.try_send(job) {
            Ok(()) => {
                active.origin = Some(origin);
                let micros = u64::try_from(pts.as_micros()).unwrap_or(u64::MAX);
                active.stats.elapsed_micros.store(micros, Ordering::Release);
                let window = inner.window.get_or_insert(RecordingWindow {
                    first: frame.pts(),
                    last: frame.pts(),
                    closed: false,
                });
                window.last = frame.pts();
                true
            }
            Err(TrySendError::Full(_)) => {
                active.stats.dropped.fetch_add(1, Ordering::Relaxed);
                log::trace!("recorder: encoder not ready, dropped frame at {:?}", frame.pts());
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("recorder: encoder thread gone, frame ignored");
                false
            }
        }
    }

    /// Stop accepting frames and finalize the artifact asynchronously.
    ///
    /// Returns `false` when nothing was armed.  Completion is reported
    /// through `RecordingFinished` or `RecordingFailed`; the state becomes
    /// `Idle` once that event has been queued.
    pub fn disarm(&self) -> bool {
        let active = {
            let mut inner = lock(&self.inner);
            if inner.state != RecorderState::Armed {
                return false;
            }
            inner.state = RecorderState::Finalizing;
            if let Some(window) = inner.window.as_mut() {
                window.closed = true;
            }
            inner.active.take()
        };
        let Some(active) = active else {
            return false;
        };

        active.ticker.abort();
        let elapsed = active.stats.elapsed();
        deliver_lossy(
            &self.events,
            PipelineEvent::DurationUpdated {
                seconds: elapsed.as_secs_f64(),
            },
        );
        log::info!("recorder: disarmed after {:.1}s, finalizing", elapsed.as_secs_f64());

        // Closing the queue lets the encoder thread drain and finish.
        drop(active.jobs);
        true
    }
}

impl FrameSink for Recorder {
    fn on_frame(&self, frame: &Frame) {
        self.submit_frame(frame);
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.disarm();
    }
}

// ---------------------------------------------------------------------------
// Duration ticker
// ---------------------------------------------------------------------------

async fn report_elapsed(events: EventSender, stats: Arc<RecordingStats>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let seconds = stats.elapsed().as_secs_f64();
        if events
            .send(PipelineEvent::DurationUpdated { seconds })
            .await
            .is_err()
        {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Encoder thread
// ---------------------------------------------------------------------------

struct EncoderWorker {
    encoder: Box<dyn VideoEncoder>,
    output: PathBuf,
    stats: Arc<RecordingStats>,
    inner: SharedInner,
    events: EventSender,
}

impl EncoderWorker {
    fn run(self, queue: Receiver<EncodeJob>) {
        let EncoderWorker {
            mut encoder,
            output,
            stats,
            inner,
            events,
        } = self;

        let mut written = 0u64;
        let mut failure: Option<VideoError> = None;

        // Ends once the recorder drops its sender in disarm().
        for job in queue.iter() {
            if failure.is_some() {
                continue;
            }
            match encoder.append(&job.frame, job.pts) {
                Ok(()) => written += 1,
                Err(e) => {
                    log::error!("recorder: encoding failed at {:?}: {e}", job.pts);
                    failure = Some(e);
                }
            }
        }

        let result = match failure {
            Some(e) => {
                drop(encoder);
                Err(RecorderError::Encode(e.to_string()))
            }
            None if written == 0 => {
                drop(encoder);
                Err(RecorderError::Finalize("no frames were recorded".into()))
            }
            None => encoder
                .finish()
                .map_err(|e| RecorderError::Finalize(e.to_string())),
        };

        if result.is_err() {
            remove_partial(&output);
        }

        let event = match result {
            Ok(()) => {
                let outcome = RecordingOutcome {
                    path: output,
                    duration: stats.elapsed(),
                    frames_written: written,
                    frames_dropped: stats.dropped.load(Ordering::Relaxed),
                };
                log::info!(
                    "recorder: finished {} ({:.2}s, {} frames, {} dropped)",
                    outcome.path.display(),
                    outcome.duration.as_secs_f64(),
                    outcome.frames_written,
                    outcome.frames_dropped
                );
                PipelineEvent::RecordingFinished(outcome)
            }
            Err(e) => {
                log::error!("recorder: {e}");
                PipelineEvent::RecordingFailed {
                    message: e.to_string(),
                }
            }
        };
        deliver_blocking(&events, event);
        lock(&inner).state = RecorderState::Idle;
    }
}

fn remove_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!("recorder: removed partial artifact {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("recorder: could not remove {}: {e}", path.display()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

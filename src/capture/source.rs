//! Frame source. Owns the active capture device and fans frames out to
//! registered sinks on a dedicated delivery thread.
//!
//! ```text
//! start() ──spawn──▶ frame-delivery thread
//!                      │  bind(position)      (device acquisition)
//!                      │  loop:
//!                      │    apply pending SessionCommand (Switch / Stop)
//!                      │    read_frame → portrait → mirror(front only)
//!                      │    └─▶ every live FrameSink::on_frame
//!                      └─ drop device on exit
//! ```
//!
//! Sinks are held as `Weak` references: the source never keeps a consumer
//! alive, and sinks that have been dropped are pruned on the next frame.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use super::{CameraBackend, CameraPosition, CaptureDevice, CaptureError, Frame};

// ---------------------------------------------------------------------------
// FrameSink
// ---------------------------------------------------------------------------

/// A consumer of live frames.
///
/// `on_frame` runs on the delivery thread and must return quickly; heavy
/// work is handed off to the consumer's own execution context.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, frame: &Frame);
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum SessionCommand {
    Switch(CameraPosition),
    Stop,
}

struct Worker {
    commands: Sender<SessionCommand>,
    thread: JoinHandle<()>,
}

type SinkList = Arc<Mutex<Vec<Weak<dyn FrameSink>>>>;

/// State readable from any thread while the delivery thread runs.
struct Shared {
    position: Mutex<CameraPosition>,
    device_bound: AtomicBool,
    frames_emitted: AtomicU64,
}

// ---------------------------------------------------------------------------
// FrameSource
// ---------------------------------------------------------------------------

/// Owns exactly one capture device binding at a time.
pub struct FrameSource {
    backend: Arc<dyn CameraBackend>,
    sinks: SinkList,
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl FrameSource {
    pub fn new(backend: Arc<dyn CameraBackend>, initial_position: CameraPosition) -> Self {
        Self {
            backend,
            sinks: Arc::new(Mutex::new(Vec::new())),
            shared: Arc::new(Shared {
                position: Mutex::new(initial_position),
                device_bound: AtomicBool::new(false),
                frames_emitted: AtomicU64::new(0),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Register a sink.  Only a weak reference is kept.
    pub fn add_sink(&self, sink: &Arc<dyn FrameSink>) {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(sink));
    }

    /// Start capturing.  Calling this while already running is a no-op.
    ///
    /// Device acquisition happens on the delivery thread, so this returns
    /// without waiting for the camera.
    ///
    /// # Errors
    ///
    /// [`CaptureError::Thread`] if the OS refuses to spawn the thread.
    pub fn start(&self) -> Result<(), CaptureError> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            log::debug!("capture: start ignored, already running");
            return Ok(());
        }

        let (commands, command_rx) = mpsc::channel();
        let backend = Arc::clone(&self.backend);
        let shared = Arc::clone(&self.shared);
        let sinks = Arc::clone(&self.sinks);

        let thread = std::thread::Builder::new()
            .name("frame-delivery".into())
            .spawn(move || delivery_loop(backend.as_ref(), &shared, &sinks, command_rx))
            .map_err(CaptureError::Thread)?;

        *worker = Some(Worker { commands, thread });
        log::info!("capture: started");
        Ok(())
    }

    /// Stop capturing and release the device.  Idempotent.
    ///
    /// Returns once the delivery thread has dropped the device, so a new
    /// acquisition elsewhere never races with this one.
    pub fn stop(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return;
        };

        let _ = worker.commands.send(SessionCommand::Stop);
        if worker.thread.join().is_err() {
            log::error!("capture: delivery thread panicked");
        }
        self.shared.device_bound.store(false, Ordering::Release);
        log::info!("capture: stopped");
    }

    /// Swap to the opposite camera position and return it.
    ///
    /// The delivery thread drops the current device and binds the new one
    /// between two frames, so sinks never see a half-configured session.
    /// When stopped, only the position used by the next `start` changes.
    pub fn switch_device(&self) -> CameraPosition {
        let next = {
            let mut position = self
                .shared
                .position
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *position = position.opposite();
            *position
        };

        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(worker) = worker.as_ref() {
            let _ = worker.commands.send(SessionCommand::Switch(next));
        }
        log::info!("capture: switching to {next:?}");
        next
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// `false` while no device is bound, either because acquisition failed
    /// or because the source is stopped.
    pub fn is_device_bound(&self) -> bool {
        self.shared.device_bound.load(Ordering::Acquire)
    }

    pub fn position(&self) -> CameraPosition {
        *self
            .shared
            .position
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Total frames delivered to sinks since construction.
    pub fn frames_emitted(&self) -> u64 {
        self.shared.frames_emitted.load(Ordering::Relaxed)
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Delivery thread
// ---------------------------------------------------------------------------

/// A bound device plus the offset that keeps timestamps monotonic across
/// device switches.
struct Binding {
    device: Box<dyn CaptureDevice>,
    position: CameraPosition,
    offset: Option<Duration>,
}

fn bind(backend: &dyn CameraBackend, position: CameraPosition, shared: &Shared) -> Option<Binding> {
    match backend.open(position) {
        Ok(device) => {
            shared.device_bound.store(true, Ordering::Release);
            log::info!("capture: bound {position:?} device");
            Some(Binding {
                device,
                position,
                offset: None,
            })
        }
        Err(e) => {
            shared.device_bound.store(false, Ordering::Release);
            log::warn!("capture: could not acquire {position:?} device: {e}");
            None
        }
    }
}

fn delivery_loop(
    backend: &dyn CameraBackend,
    shared: &Shared,
    sinks: &SinkList,
    commands: Receiver<SessionCommand>,
) {
    let initial = *shared.position.lock().unwrap_or_else(PoisonError::into_inner);
    let mut binding = bind(backend, initial, shared);
    let mut last_pts: Option<Duration> = None;

    loop {
        // Without a device there is nothing to read; park until told
        // otherwise instead of spinning.
        let command = if binding.is_some() {
            match commands.try_recv() {
                Ok(command) => Some(command),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => Some(SessionCommand::Stop),
            }
        } else {
            Some(commands.recv().unwrap_or(SessionCommand::Stop))
        };

        match command {
            Some(SessionCommand::Stop) => break,
            Some(SessionCommand::Switch(next)) => {
                // Remove before add: the old device is released first.
                drop(binding.take());
                shared.device_bound.store(false, Ordering::Release);
                binding = bind(backend, next, shared);
                continue;
            }
            None => {}
        }

        let Some(active) = binding.as_mut() else {
            continue;
        };

        let frame = match active.device.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("capture: device read failed, unbinding: {e}");
                binding = None;
                shared.device_bound.store(false, Ordering::Release);
                continue;
            }
        };

        let offset = *active.offset.get_or_insert_with(|| match last_pts {
            Some(last) if frame.pts() <= last => last - frame.pts() + Duration::from_millis(1),
            _ => Duration::ZERO,
        });
        let pts = frame.pts() + offset;
        if last_pts.is_some_and(|last| pts <= last) {
            log::trace!("capture: dropping out-of-order frame at {pts:?}");
            continue;
        }
        last_pts = Some(pts);

        let mut frame = frame.to_portrait().with_pts(pts);
        if active.position.is_mirrored() {
            frame = frame.mirrored();
        }

        dispatch(sinks, &frame);
        shared.frames_emitted.fetch_add(1, Ordering::Relaxed);
    }

    drop(binding);
    shared.device_bound.store(false, Ordering::Release);
}

fn dispatch(sinks: &SinkList, frame: &Frame) {
    let live: Vec<Arc<dyn FrameSink>> = {
        let mut sinks = sinks.lock().unwrap_or_else(PoisonError::into_inner);
        sinks.retain(|sink| sink.strong_count() > 0);
        sinks.iter().filter_map(Weak::upgrade).collect()
    };
    for sink in live {
        sink.on_frame(frame);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Instant;

    /// Backend whose devices replay a fixed pts sequence, then idle.
    struct ScriptedBackend {
        pts_ms: Vec<u64>,
        fail_positions: Vec<CameraPosition>,
        opened: Mutex<Vec<CameraPosition>>,
    }

    impl ScriptedBackend {
        fn new(pts_ms: Vec<u64>) -> Self {
            Self {
                pts_ms,
                fail_positions: Vec::new(),
                opened: Mutex::new(Vec::new()),
            }
        }
    }

    impl CameraBackend for ScriptedBackend {
        fn open(&self, position: CameraPosition) -> Result<Box<dyn CaptureDevice>, CaptureError> {
            if self.fail_positions.contains(&position) {
                return Err(CaptureError::NotGranted);
            }
            self.opened.lock().unwrap().push(position);
            Ok(Box::new(ScriptedDevice {
                pts: self.pts_ms.iter().copied().collect(),
                width: if position == CameraPosition::Front { 2 } else { 4 },
            }))
        }
    }

    struct ScriptedDevice {
        pts: VecDeque<u64>,
        width: u32,
    }

    impl CaptureDevice for ScriptedDevice {
        fn read_frame(&mut self) -> Result<Frame, CaptureError> {
            std::thread::sleep(Duration::from_millis(1));
            match self.pts.pop_front() {
                Some(ms) => {
                    let mut data = vec![0u8; self.width as usize * 8 * 3];
                    data[0] = 255; // mark the top-left pixel
                    Frame::from_rgb(self.width, 8, data, Duration::from_millis(ms))
                }
                None => {
                    std::thread::sleep(Duration::from_millis(5));
                    Err(CaptureError::Disconnected)
                }
            }
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        frames: Mutex<Vec<Frame>>,
    }

    impl FrameSink for CollectingSink {
        fn on_frame(&self, frame: &Frame) {
            self.frames.lock().unwrap().push(frame.clone());
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn collecting(source: &FrameSource) -> (Arc<CollectingSink>, Arc<dyn FrameSink>) {
        let sink = Arc::new(CollectingSink::default());
        let dyn_sink: Arc<dyn FrameSink> = sink.clone();
        source.add_sink(&dyn_sink);
        (sink, dyn_sink)
    }

    #[test]
    fn delivers_frames_in_order_with_increasing_pts() {
        let backend = Arc::new(ScriptedBackend::new(vec![0, 33, 66, 100]));
        let source = FrameSource::new(backend, CameraPosition::Back);
        let (sink, _keep) = collecting(&source);

        source.start().unwrap();
        assert!(wait_until(|| sink.frames.lock().unwrap().len() == 4));
        source.stop();

        let pts: Vec<u64> = sink
            .frames
            .lock()
            .unwrap()
            .iter()
            .map(|f| f.pts().as_millis() as u64)
            .collect();
        assert_eq!(pts, vec![0, 33, 66, 100]);
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let backend = Arc::new(ScriptedBackend::new(vec![0, 10]));
        let source = FrameSource::new(backend.clone(), CameraPosition::Back);

        source.start().unwrap();
        source.start().unwrap();
        assert!(source.is_running());
        assert!(wait_until(|| backend.opened.lock().unwrap().len() == 1));

        source.stop();
        source.stop();
        assert!(!source.is_running());
        assert!(!source.is_device_bound());
        assert_eq!(backend.opened.lock().unwrap().len(), 1);
    }

    #[test]
    fn non_monotonic_frames_are_dropped() {
        let backend = Arc::new(ScriptedBackend::new(vec![10, 20, 15, 20, 30]));
        let source = FrameSource::new(backend, CameraPosition::Back);
        let (sink, _keep) = collecting(&source);

        source.start().unwrap();
        assert!(wait_until(|| sink.frames.lock().unwrap().len() == 3));
        std::thread::sleep(Duration::from_millis(20));
        source.stop();

        let pts: Vec<u128> = sink
            .frames
            .lock()
            .unwrap()
            .iter()
            .map(|f| f.pts().as_millis())
            .collect();
        assert_eq!(pts, vec![10, 20, 30]);
    }

    #[test]
    fn acquisition_failure_degrades_to_no_frames() {
        let mut backend = ScriptedBackend::new(vec![0, 10, 20]);
        backend.fail_positions = vec![CameraPosition::Back];
        let source = FrameSource::new(Arc::new(backend), CameraPosition::Back);
        let (sink, _keep) = collecting(&source);

        source.start().unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert!(!source.is_device_bound());
        assert!(sink.frames.lock().unwrap().is_empty());
        source.stop();
    }

    #[test]
    fn switch_rebinds_and_mirrors_front_frames() {
        let backend = Arc::new(ScriptedBackend::new((0..200).map(|i| i * 10).collect()));
        let source = FrameSource::new(backend.clone(), CameraPosition::Back);
        let (sink, _keep) = collecting(&source);

        source.start().unwrap();
        assert!(wait_until(|| !sink.frames.lock().unwrap().is_empty()));
        assert_eq!(source.switch_device(), CameraPosition::Front);
        assert!(wait_until(|| sink
            .frames
            .lock()
            .unwrap()
            .iter()
            .any(|f| f.width() == 2)));
        source.stop();

        assert_eq!(
            *backend.opened.lock().unwrap(),
            vec![CameraPosition::Back, CameraPosition::Front]
        );

        let frames = sink.frames.lock().unwrap();
        // Back frames keep the marker top-left; front frames are mirrored.
        let back = frames.iter().find(|f| f.width() == 4).unwrap();
        let front = frames.iter().find(|f| f.width() == 2).unwrap();
        assert_eq!(back.data()[0], 255);
        assert_eq!(front.data()[0], 0);
        assert_eq!(front.data()[3], 255);

        // Timestamps keep increasing across the switch.
        for pair in frames.windows(2) {
            assert!(pair[1].pts() > pair[0].pts());
        }
    }

    #[test]
    fn dropped_sinks_are_not_kept_alive() {
        let backend = Arc::new(ScriptedBackend::new((0..50).map(|i| i * 10).collect()));
        let source = FrameSource::new(backend, CameraPosition::Back);
        let (sink, keep) = collecting(&source);
        let weak = Arc::downgrade(&sink);
        drop(sink);
        drop(keep);

        source.start().unwrap();
        assert!(wait_until(|| source.frames_emitted() > 0));
        source.stop();
        assert!(weak.upgrade().is_none());
    }
}

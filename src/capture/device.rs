//! Capture device abstraction.
//!
//! [`CameraBackend`] acquires a [`CaptureDevice`] for a [`CameraPosition`];
//! the device then yields frames on whichever thread calls
//! [`CaptureDevice::read_frame`].  The frame source owns both and drives
//! the device from its delivery thread.

use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};

use super::{CameraPosition, CaptureError, Frame};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Acquires capture devices.  Object-safe so it can live behind
/// `Arc<dyn CameraBackend>`.
pub trait CameraBackend: Send + Sync {
    /// Open the device at `position`.
    ///
    /// May block for a while (permission prompts, device warm-up); callers
    /// run it off the UI thread.
    fn open(&self, position: CameraPosition) -> Result<Box<dyn CaptureDevice>, CaptureError>;
}

/// A bound capture device.  Dropping it releases the hardware.
pub trait CaptureDevice: Send {
    /// Block until the next frame is available.
    ///
    /// Timestamps come from the device clock and are expected to increase.
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn CameraBackend>, _: Box<dyn CaptureDevice>) {}
};

// ---------------------------------------------------------------------------
// TestPatternCamera
// ---------------------------------------------------------------------------

/// Synthetic backend that paces colour-bar frames at a fixed rate.
///
/// Used when no hardware backend is compiled in, so the rest of the
/// pipeline can run headless.
#[derive(Debug, Clone)]
pub struct TestPatternCamera {
    width: u32,
    height: u32,
    frame_rate: u32,
}

impl TestPatternCamera {
    pub fn new(width: u32, height: u32, frame_rate: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            frame_rate: frame_rate.max(1),
        }
    }
}

impl CameraBackend for TestPatternCamera {
    fn open(&self, position: CameraPosition) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        log::debug!(
            "capture: test pattern {}x{} @ {} fps ({position:?})",
            self.width,
            self.height,
            self.frame_rate
        );
        Ok(Box::new(TestPatternDevice {
            width: self.width,
            height: self.height,
            interval: Duration::from_secs(1) / self.frame_rate,
            tint: match position {
                CameraPosition::Front => [40, 120, 200],
                CameraPosition::Back => [200, 120, 40],
            },
            opened_at: Instant::now(),
            index: 0,
        }))
    }
}

struct TestPatternDevice {
    width: u32,
    height: u32,
    interval: Duration,
    tint: [u8; 3],
    opened_at: Instant,
    index: u32,
}

impl CaptureDevice for TestPatternDevice {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let pts = self.interval * self.index;
        let due = self.opened_at + pts;
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }

        // A bright bar sweeps left to right so motion is visible on playback.
        let bar = self.index % self.width;
        let tint = self.tint;
        let image = RgbImage::from_fn(self.width, self.height, |x, _| {
            if x == bar {
                Rgb([255, 255, 255])
            } else {
                Rgb(tint)
            }
        });

        self.index += 1;
        Ok(Frame::from_image(image, pts))
    }
}

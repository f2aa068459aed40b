//! Webcam backend via `nokhwa`.
//!
//! Index 0 is treated as the user-facing camera and index 1 as the
//! world-facing one, which matches how laptops with an external camera
//! usually enumerate.

use std::time::Instant;

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

use super::{CameraBackend, CameraPosition, CaptureDevice, CaptureError, Frame};

#[derive(Debug, Default, Clone)]
pub struct WebcamBackend;

impl WebcamBackend {
    pub fn new() -> Self {
        Self
    }

    fn index_for(position: CameraPosition) -> CameraIndex {
        match position {
            CameraPosition::Front => CameraIndex::Index(0),
            CameraPosition::Back => CameraIndex::Index(1),
        }
    }
}

impl CameraBackend for WebcamBackend {
    fn open(&self, position: CameraPosition) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(Self::index_for(position), format)
            .map_err(|_| CaptureError::NoDevice(position))?;
        camera
            .open_stream()
            .map_err(|e| CaptureError::Backend(e.to_string()))?;

        log::info!("capture: webcam {} opened", camera.info().human_name());
        Ok(Box::new(WebcamDevice {
            camera,
            clock: Instant::now(),
        }))
    }
}

struct WebcamDevice {
    camera: Camera,
    clock: Instant,
}

// SAFETY: the camera handle is only ever touched from the delivery thread
// that owns this device; it is moved there once and never shared.
unsafe impl Send for WebcamDevice {}

impl CaptureDevice for WebcamDevice {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CaptureError::Backend(e.to_string()))?;
        let pts = self.clock.elapsed();
        let image = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CaptureError::Backend(e.to_string()))?;
        Ok(Frame::from_image(image, pts))
    }
}

impl Drop for WebcamDevice {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            log::warn!("capture: webcam stop failed: {e}");
        }
    }
}

//! Frame and camera-position types shared by capture, inference and
//! recording.

use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::CaptureError;

// ---------------------------------------------------------------------------
// CameraPosition
// ---------------------------------------------------------------------------

/// The two logical capture positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraPosition {
    /// User-facing camera.  Frames are mirrored.
    Front,
    /// World-facing camera.
    Back,
}

impl CameraPosition {
    /// The other position, used by device switching.
    pub fn opposite(self) -> Self {
        match self {
            CameraPosition::Front => CameraPosition::Back,
            CameraPosition::Back => CameraPosition::Front,
        }
    }

    /// Mirroring applies to the user-facing position only.
    pub fn is_mirrored(self) -> bool {
        matches!(self, CameraPosition::Front)
    }
}

impl Default for CameraPosition {
    fn default() -> Self {
        CameraPosition::Back
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// A single decoded video frame: packed RGB8 pixels plus its presentation
/// timestamp on the producing clock.
///
/// Pixel data sits behind an `Arc` so handing the same frame to the pose
/// estimator and the recorder costs a reference-count bump, not a copy.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
    pts: Duration,
}

impl Frame {
    /// Bytes per pixel of the packed RGB8 layout.
    pub const BYTES_PER_PIXEL: usize = 3;

    /// Build a frame from packed RGB8 pixels.
    ///
    /// # Errors
    ///
    /// [`CaptureError::InvalidFrame`] when `data` does not hold exactly
    /// `width * height * 3` bytes.
    pub fn from_rgb(
        width: u32,
        height: u32,
        data: Vec<u8>,
        pts: Duration,
    ) -> Result<Self, CaptureError> {
        let expected = width as usize * height as usize * Self::BYTES_PER_PIXEL;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(CaptureError::InvalidFrame {
                width,
                height,
                len: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data: data.into(),
            pts,
        })
    }

    /// Build a frame from an [`RgbImage`].
    pub fn from_image(image: RgbImage, pts: Duration) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw().into(),
            pts,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Presentation timestamp.
    pub fn pts(&self) -> Duration {
        self.pts
    }

    /// Packed RGB8 pixel rows, top row first.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Copy the pixels into an owned [`RgbImage`].
    pub fn to_image(&self) -> RgbImage {
        // Length was validated on construction, so from_raw cannot fail.
        RgbImage::from_raw(self.width, self.height, self.data.to_vec())
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    /// Same pixels, new timestamp.
    pub fn with_pts(&self, pts: Duration) -> Self {
        Self {
            pts,
            ..self.clone()
        }
    }

    /// Flip horizontally.
    pub fn mirrored(&self) -> Self {
        Self::from_image(image::imageops::flip_horizontal(&self.to_image()), self.pts)
    }

    /// Rotate landscape frames a quarter turn clockwise so the output is
    /// always portrait.  Portrait frames are returned unchanged.
    pub fn to_portrait(&self) -> Self {
        if self.width <= self.height {
            return self.clone();
        }
        Self::from_image(image::imageops::rotate90(&self.to_image()), self.pts)
    }
}

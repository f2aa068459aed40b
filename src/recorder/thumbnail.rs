//! Poster-frame thumbnails for finished recordings.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};

use crate::video::{ArtifactReader, VideoError};

/// Longest edge of a generated thumbnail, in pixels.
pub const THUMBNAIL_MAX_EDGE: u32 = 300;

/// JPEG of the artifact's first frame, scaled to fit within
/// [`THUMBNAIL_MAX_EDGE`] on each side.
///
/// Decoding runs on the blocking pool.  Any failure is logged and yields
/// `None`; a missing thumbnail never fails the session.
pub async fn generate_thumbnail(path: PathBuf) -> Option<Vec<u8>> {
    let display = path.display().to_string();
    match tokio::task::spawn_blocking(move || encode_poster_frame(&path)).await {
        Ok(Ok(jpeg)) => Some(jpeg),
        Ok(Err(e)) => {
            log::warn!("thumbnail: {display}: {e}");
            None
        }
        Err(e) => {
            log::warn!("thumbnail: task for {display} failed: {e}");
            None
        }
    }
}

/// Synchronous core of [`generate_thumbnail`].
pub fn encode_poster_frame(path: &Path) -> Result<Vec<u8>, VideoError> {
    let mut reader = ArtifactReader::open(path)?;
    let frame = reader.read_frame(0)?;

    let mut image = DynamicImage::ImageRgb8(frame.to_image());
    if image.width() > THUMBNAIL_MAX_EDGE || image.height() > THUMBNAIL_MAX_EDGE {
        image = image.thumbnail(THUMBNAIL_MAX_EDGE, THUMBNAIL_MAX_EDGE);
    }

    let mut jpeg = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
        .map_err(|e| VideoError::Image(e.to_string()))?;
    Ok(jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::capture::Frame;
    use crate::video::{ArtifactWriter, OutputProfile};

    fn write_clip(path: &Path, width: u32, height: u32) {
        let profile = OutputProfile {
            width,
            height,
            ..Default::default()
        };
        let mut writer = ArtifactWriter::create(path, profile).unwrap();
        let pixels = vec![200u8; (width * height * 3) as usize];
        let frame = Frame::from_rgb(width, height, pixels, Duration::ZERO).unwrap();
        writer.write_frame(&frame, Duration::ZERO).unwrap();
        writer.finish().unwrap();
    }

    #[tokio::test]
    async fn portrait_clip_fits_bounding_box() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        write_clip(&path, 360, 640);

        let jpeg = generate_thumbnail(path).await.unwrap();
        let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert!(decoded.width() <= THUMBNAIL_MAX_EDGE);
        assert_eq!(decoded.height(), THUMBNAIL_MAX_EDGE);
    }

    #[tokio::test]
    async fn small_clip_is_not_upscaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        write_clip(&path, 16, 32);

        let jpeg = generate_thumbnail(path).await.unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 32));
    }

    #[tokio::test]
    async fn corrupt_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"definitely not video").unwrap();

        assert!(generate_thumbnail(path).await.is_none());
    }

    #[tokio::test]
    async fn missing_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(generate_thumbnail(dir.path().join("gone.mp4")).await.is_none());
    }
}

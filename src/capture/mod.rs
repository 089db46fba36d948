//! Camera Capture Layer
//!
//! The camera itself is an external collaborator. This module defines the
//! traits the session controller talks to and the scoped handle that makes
//! sure a stream is stopped exactly once.

pub mod frame;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::MediaAcquisitionError;
use frame::Frame;

/// Which camera to prefer when several are present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    /// Rear camera
    #[default]
    Environment,
    /// Front camera
    User,
}

/// A running camera stream
#[async_trait]
pub trait CameraStream: Send {
    /// Grab the current frame as RGBA pixels
    async fn grab_frame(&mut self) -> Result<Frame, MediaAcquisitionError>;

    /// Stop every track of the stream
    fn stop(&mut self);

    /// Human readable label for logs
    fn label(&self) -> String {
        "camera".to_string()
    }
}

/// Supplier of camera streams
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(
        &self,
        facing: FacingMode,
    ) -> Result<Box<dyn CameraStream>, MediaAcquisitionError>;
}

/// Owns a camera stream and stops it when released or dropped
pub struct CameraHandle {
    stream: Option<Box<dyn CameraStream>>,
}

impl CameraHandle {
    pub fn new(stream: Box<dyn CameraStream>) -> Self {
        info!("Camera acquired: {}", stream.label());
        Self {
            stream: Some(stream),
        }
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    pub async fn grab_frame(&mut self) -> Result<Frame, MediaAcquisitionError> {
        match self.stream.as_mut() {
            Some(stream) => stream.grab_frame().await,
            None => Err(MediaAcquisitionError::Released),
        }
    }

    /// Stop the stream. Calling this more than once has no further effect.
    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            info!("Camera released: {}", stream.label());
        }
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Serves a single still image as if it were a live camera
pub struct StillImageSource {
    path: PathBuf,
}

impl StillImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MediaSource for StillImageSource {
    async fn acquire(
        &self,
        facing: FacingMode,
    ) -> Result<Box<dyn CameraStream>, MediaAcquisitionError> {
        if facing != FacingMode::Environment {
            warn!("Still image source ignores facing mode {:?}", facing);
        }

        let path = self.path.clone();
        let image = tokio::task::spawn_blocking(move || image::open(&path))
            .await
            .map_err(|e| MediaAcquisitionError::Unavailable(format!("loader task failed: {e}")))?
            .map_err(|e| {
                MediaAcquisitionError::Unavailable(format!("{}: {e}", self.path.display()))
            })?;

        let rgba = image.to_rgba8();
        debug!(
            "Loaded still image {:?} ({}x{})",
            self.path,
            rgba.width(),
            rgba.height()
        );

        Ok(Box::new(StillImageStream {
            label: self.path.display().to_string(),
            width: rgba.width(),
            height: rgba.height(),
            pixels: Some(rgba.into_raw()),
        }))
    }
}

struct StillImageStream {
    label: String,
    width: u32,
    height: u32,
    pixels: Option<Vec<u8>>,
}

#[async_trait]
impl CameraStream for StillImageStream {
    async fn grab_frame(&mut self) -> Result<Frame, MediaAcquisitionError> {
        let pixels = self.pixels.as_ref().ok_or(MediaAcquisitionError::Released)?;
        Frame::new(pixels.clone(), self.width, self.height)
    }

    fn stop(&mut self) {
        self.pixels = None;
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingStream {
        stops: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CameraStream for CountingStream {
        async fn grab_frame(&mut self) -> Result<Frame, MediaAcquisitionError> {
            Frame::new(vec![255; 4], 1, 1)
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_release_stops_once() {
        let stops = Arc::new(AtomicUsize::new(0));
        let mut handle = CameraHandle::new(Box::new(CountingStream {
            stops: stops.clone(),
        }));

        handle.release();
        handle.release();
        drop(handle);

        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_stops_stream() {
        let stops = Arc::new(AtomicUsize::new(0));
        {
            let _handle = CameraHandle::new(Box::new(CountingStream {
                stops: stops.clone(),
            }));
        }
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_grab_after_release_fails() {
        let stops = Arc::new(AtomicUsize::new(0));
        let mut handle = CameraHandle::new(Box::new(CountingStream { stops }));
        assert!(handle.grab_frame().await.is_ok());

        handle.release();
        assert!(!handle.is_active());
        assert_eq!(
            handle.grab_frame().await.unwrap_err(),
            MediaAcquisitionError::Released
        );
    }

    #[tokio::test]
    async fn test_still_image_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tag.png");
        image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let source = StillImageSource::new(&path);
        let mut stream = source.acquire(FacingMode::Environment).await.unwrap();
        let frame = stream.grab_frame().await.unwrap();
        assert_eq!((frame.width(), frame.height()), (3, 2));
        assert_eq!(&frame.data()[..4], &[10, 20, 30, 255]);

        stream.stop();
        assert!(stream.grab_frame().await.is_err());
    }

    #[tokio::test]
    async fn test_still_image_source_missing_file() {
        let source = StillImageSource::new("/nonexistent/tag.png");
        let err = source.acquire(FacingMode::Environment).await.err().unwrap();
        assert!(matches!(err, MediaAcquisitionError::Unavailable(_)));
    }
}

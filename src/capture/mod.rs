//! Camera Layer
//!
//! Ports for the camera device the capture session drives. The stream is
//! an exclusive resource: at most one active session holds it, and it
//! must be released on every exit path. Release is idempotent so the
//! teardown paths (retake, confirm, close, drop) can all call it safely.

pub mod frame;

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::debug;

use crate::error::ScanError;
pub use frame::{DisplayGeometry, Frame};

/// A camera device that can be opened into a live stream.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Acquire the camera. Fails with [`ScanError::CameraUnavailable`]
    /// when access is denied or the device is missing.
    async fn acquire(&self) -> Result<Box<dyn CameraStream>, ScanError>;
}

/// An acquired live camera stream.
#[async_trait]
pub trait CameraStream: Send {
    /// Freeze the current frame out of the live feed.
    async fn grab_frame(&mut self) -> Result<Frame, ScanError>;

    /// On-screen viewport geometry for this stream.
    fn display_geometry(&self) -> DisplayGeometry;

    /// Stop the stream and release the device. Must be a no-op when
    /// called more than once.
    fn release(&mut self);
}

/// Camera backed by still image files, one per acquisition.
///
/// Stands in for live camera hardware: each `acquire` decodes the next
/// configured image and serves it as a single-frame stream. Drives the
/// CLI scan flow and the two-step part/VIN capture (one file per pass).
#[derive(Debug)]
pub struct StillCamera {
    sources: Vec<PathBuf>,
    display: DisplayGeometry,
    cursor: AtomicUsize,
}

impl StillCamera {
    pub fn new(sources: Vec<PathBuf>, display: DisplayGeometry) -> Result<Self, ScanError> {
        if sources.is_empty() {
            return Err(ScanError::CameraUnavailable(
                "no image sources configured".to_string(),
            ));
        }
        Ok(Self {
            sources,
            display,
            cursor: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CameraDevice for StillCamera {
    async fn acquire(&self) -> Result<Box<dyn CameraStream>, ScanError> {
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst) % self.sources.len();
        let path = self.sources[idx].clone();

        debug!(source = %path.display(), "opening still camera source");

        let decoded = tokio::task::spawn_blocking(move || {
            image::open(&path).map_err(|err| (path, err))
        })
        .await
        .map_err(|err| ScanError::CameraUnavailable(format!("decode task failed: {err}")))?;

        let image = decoded.map_err(|(path, err)| {
            ScanError::CameraUnavailable(format!("failed to read {}: {err}", path.display()))
        })?;

        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let frame = Frame::new(rgba.into_raw(), width, height);

        Ok(Box::new(StillStream {
            frame: Some(frame),
            display: self.display,
            released: false,
        }))
    }
}

struct StillStream {
    frame: Option<Frame>,
    display: DisplayGeometry,
    released: bool,
}

#[async_trait]
impl CameraStream for StillStream {
    async fn grab_frame(&mut self) -> Result<Frame, ScanError> {
        if self.released {
            return Err(ScanError::CameraUnavailable(
                "stream already released".to_string(),
            ));
        }
        self.frame.take().ok_or_else(|| {
            ScanError::CameraUnavailable("still stream already consumed".to_string())
        })
    }

    fn display_geometry(&self) -> DisplayGeometry {
        self.display
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.frame = None;
            debug!("camera stream released");
        }
    }
}

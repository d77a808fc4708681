//! Frame data structures for captured camera content

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};

/// An immutable still image captured from a live camera feed.
///
/// Exactly one frame is active per capture step; a retake discards it
/// along with any recognition results derived from it.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw RGBA pixel data
    data: Vec<u8>,
    /// Frame width in pixels
    width: u32,
    /// Frame height in pixels
    height: u32,
    /// When the frame was captured
    captured_at: DateTime<Utc>,
}

impl Frame {
    /// Create a new frame from raw RGBA pixels
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            captured_at: Utc::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Encode the frame as a PNG data URL for attaching to scan records.
    pub fn to_data_url(&self) -> Result<String> {
        let img = image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .context("frame buffer does not match its dimensions")?;
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )?;
        Ok(format!("data:image/png;base64,{}", BASE64.encode(&bytes)))
    }
}

/// The on-screen size of the camera viewport at the moment of capture.
/// Read once per capture; bounding boxes are laid out in this space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayGeometry {
    pub width: u32,
    pub height: u32,
}

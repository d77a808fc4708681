//! Region extraction from captured frames

use crate::capture::Frame;
use crate::error::ScanError;
use crate::vision::geometry::FrameRect;

/// A cropped image region ready for text recognition.
#[derive(Debug, Clone)]
pub struct RegionImage {
    /// Bounding box this region was cropped for
    pub box_id: String,
    /// RGBA pixel data, exactly `width * height * 4` bytes
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Crop a frame-space rectangle out of a frame.
///
/// All-or-nothing: either the full `width x height` buffer is produced
/// or the call fails with [`ScanError::ExtractionFailed`]. The rect is
/// expected to be validated by the coordinate mapper first.
pub fn extract_region(
    frame: &Frame,
    box_id: &str,
    rect: &FrameRect,
) -> Result<RegionImage, ScanError> {
    let fail = || ScanError::ExtractionFailed {
        box_id: box_id.to_string(),
    };

    let x = rect.x.max(0.0).floor() as u32;
    let y = rect.y.max(0.0).floor() as u32;
    let width = (rect.width.round() as u32).max(1);
    let height = (rect.height.round() as u32).max(1);

    if x >= frame.width() || y >= frame.height() {
        return Err(fail());
    }
    let width = width.min(frame.width() - x);
    let height = height.min(frame.height() - y);

    let src = frame.data();
    let expected_len = frame.width() as usize * frame.height() as usize * 4;
    if src.len() < expected_len {
        // Unreadable source buffer
        return Err(fail());
    }

    let mut data = Vec::with_capacity(width as usize * height as usize * 4);
    for row in y..(y + height) {
        let start = ((row * frame.width() + x) * 4) as usize;
        let end = start + width as usize * 4;
        data.extend_from_slice(&src[start..end]);
    }

    if data.len() != width as usize * height as usize * 4 {
        return Err(fail());
    }

    Ok(RegionImage {
        box_id: box_id.to_string(),
        data,
        width,
        height,
    })
}

impl RegionImage {
    /// Encode the region as PNG bytes for the remote OCR endpoint.
    pub fn to_png(&self) -> anyhow::Result<Vec<u8>> {
        let img = image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| anyhow::anyhow!("region buffer does not match its dimensions"))?;
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )?;
        Ok(bytes)
    }
}

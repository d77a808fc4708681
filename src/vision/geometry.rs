//! Display-to-frame coordinate mapping
//!
//! The camera feed is rendered with "cover" fit: the frame is scaled to
//! fill the viewport and the overflowing axis is cropped symmetrically.
//! Bounding boxes are laid out in display space, so before cropping they
//! must be mapped back into native frame pixels.

use crate::capture::DisplayGeometry;
use crate::config::{BoundingBox, BoxUnits};
use crate::error::ScanError;

/// A rectangle in frame-pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Floating-point slack for the frame-bounds check.
const BOUNDS_TOLERANCE: f64 = 1e-6;

/// Map a display-space bounding box into frame-pixel coordinates.
///
/// Pure function. Fails with [`ScanError::InvalidGeometry`] when any
/// dimension is zero, and with [`ScanError::RegionOutOfBounds`] when the
/// mapped rectangle leaves the frame; the caller degrades only that box.
pub fn map_to_frame(
    frame_width: u32,
    frame_height: u32,
    display: &DisplayGeometry,
    bbox: &BoundingBox,
) -> Result<FrameRect, ScanError> {
    if frame_width == 0 || frame_height == 0 || display.width == 0 || display.height == 0 {
        return Err(ScanError::InvalidGeometry(format!(
            "zero dimension: frame {}x{}, display {}x{}",
            frame_width, frame_height, display.width, display.height
        )));
    }

    let fw = frame_width as f64;
    let fh = frame_height as f64;
    let dw = display.width as f64;
    let dh = display.height as f64;

    let (bx, by, bw, bh) = match bbox.units {
        BoxUnits::Pixels => (bbox.x, bbox.y, bbox.width, bbox.height),
        BoxUnits::Fraction => (bbox.x * dw, bbox.y * dh, bbox.width * dw, bbox.height * dh),
    };

    let video_aspect = fw / fh;
    let display_aspect = dw / dh;

    // Under cover fit exactly one axis of the frame is cropped. The
    // scale is locked to the uncropped axis and the cropped axis gets a
    // centered offset.
    let (scale, offset_x, offset_y) = if video_aspect > display_aspect {
        // Frame wider than the viewport: width-cropped
        let scale = fh / dh;
        (scale, ((fw - dw * scale) / 2.0).max(0.0), 0.0)
    } else {
        // Frame taller than (or matching) the viewport: height-cropped
        let scale = fw / dw;
        (scale, 0.0, ((fh - dh * scale) / 2.0).max(0.0))
    };

    let rect = FrameRect {
        x: bx * scale + offset_x,
        y: by * scale + offset_y,
        width: bw * scale,
        height: bh * scale,
    };

    let out_of_bounds = rect.width <= 0.0
        || rect.height <= 0.0
        || rect.x < -BOUNDS_TOLERANCE
        || rect.y < -BOUNDS_TOLERANCE
        || rect.x + rect.width > fw + BOUNDS_TOLERANCE
        || rect.y + rect.height > fh + BOUNDS_TOLERANCE;
    if out_of_bounds {
        return Err(ScanError::RegionOutOfBounds {
            box_id: bbox.id.clone(),
        });
    }

    Ok(rect)
}

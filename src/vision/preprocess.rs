//! Region preprocessing before text recognition
//!
//! Label crops are often tiny; OCR engines need roughly 40+ pixels of
//! glyph height to detect text reliably. Small regions are upscaled
//! with bilinear interpolation, then optional contrast and grayscale
//! filters are applied.

use tracing::debug;

use crate::config::PreprocessSettings;
use crate::vision::extract::RegionImage;

/// Upscale factors stay within this range
const MIN_SCALE: u32 = 2;
const MAX_SCALE: u32 = 4;

/// Apply the configured preprocessing to a cropped region.
pub fn prepare_region(region: RegionImage, settings: &PreprocessSettings) -> RegionImage {
    if !settings.enabled {
        return region;
    }

    let scale = upscale_factor(region.width, region.height, settings.min_dimension);
    let (mut data, width, height) = if scale > 1 {
        debug!(
            box_id = %region.box_id,
            from = format!("{}x{}", region.width, region.height),
            scale,
            "upscaling small region before OCR"
        );
        (
            upscale_bilinear(&region.data, region.width, region.height, scale),
            region.width * scale,
            region.height * scale,
        )
    } else {
        (region.data, region.width, region.height)
    };

    if (settings.contrast - 1.0).abs() > 0.01 {
        apply_contrast(&mut data, settings.contrast);
    }
    if settings.grayscale {
        apply_grayscale(&mut data);
    }

    RegionImage {
        box_id: region.box_id,
        data,
        width,
        height,
    }
}

/// Integer upscale factor bringing both dimensions up to `min_dimension`.
fn upscale_factor(width: u32, height: u32, min_dimension: u32) -> u32 {
    if min_dimension == 0 || width == 0 || height == 0 {
        return 1;
    }
    if width >= min_dimension && height >= min_dimension {
        return 1;
    }
    let by_width = min_dimension.div_ceil(width);
    let by_height = min_dimension.div_ceil(height);
    by_width.max(by_height).clamp(MIN_SCALE, MAX_SCALE)
}

/// Contrast adjustment around the 128 midpoint, alpha untouched.
fn apply_contrast(data: &mut [u8], factor: f32) {
    for px in data.chunks_exact_mut(4) {
        for channel in px.iter_mut().take(3) {
            let adjusted = ((*channel as f32 - 128.0) * factor + 128.0).clamp(0.0, 255.0);
            *channel = adjusted as u8;
        }
    }
}

/// Luminance grayscale, kept in RGBA layout.
fn apply_grayscale(data: &mut [u8]) {
    for px in data.chunks_exact_mut(4) {
        let gray =
            (0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32) as u8;
        px[0] = gray;
        px[1] = gray;
        px[2] = gray;
    }
}

/// Bilinear upscale of RGBA data by an integer factor.
fn upscale_bilinear(data: &[u8], width: u32, height: u32, scale: u32) -> Vec<u8> {
    if scale <= 1 {
        return data.to_vec();
    }

    let src_w = width as usize;
    let src_h = height as usize;
    let dst_w = src_w * scale as usize;
    let dst_h = src_h * scale as usize;
    let scale_f = scale as f32;
    let mut result = vec![0u8; dst_w * dst_h * 4];

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 / scale_f;
            let sy = dy as f32 / scale_f;

            let x0 = (sx.floor() as usize).min(src_w - 1);
            let y0 = (sy.floor() as usize).min(src_h - 1);
            let x1 = (x0 + 1).min(src_w - 1);
            let y1 = (y0 + 1).min(src_h - 1);
            let wx = sx - sx.floor();
            let wy = sy - sy.floor();

            let dst = (dy * dst_w + dx) * 4;
            for c in 0..4 {
                let p00 = data[(y0 * src_w + x0) * 4 + c] as f32;
                let p10 = data[(y0 * src_w + x1) * 4 + c] as f32;
                let p01 = data[(y1 * src_w + x0) * 4 + c] as f32;
                let p11 = data[(y1 * src_w + x1) * 4 + c] as f32;

                let top = p00 * (1.0 - wx) + p10 * wx;
                let bottom = p01 * (1.0 - wx) + p11 * wx;
                result[dst + c] = (top * (1.0 - wy) + bottom * wy).clamp(0.0, 255.0) as u8;
            }
        }
    }

    result
}

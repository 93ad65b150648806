//! Best-effort image optimization for OCR transport.
//!
//! Rotation is applied before the dimension bound so a 90/270 degree turn
//! swaps width and height first. Contrast enhancement is skipped for very
//! large frames to bound latency. Every failure path hands back the original
//! blob unchanged; the caller always gets something the backend can try.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use tracing::debug;

use super::ImageBlob;

/// Pixel budget above which the per-pixel contrast pass is skipped.
const CONTRAST_PIXEL_LIMIT: u64 = 4_000_000;

/// JPEG quality used when the caller asks for `Quality::Auto`.
const AUTO_QUALITY: f32 = 0.85;

/// Rotation applied before the dimension bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

/// Encoding quality in (0, 1], or automatic.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Quality {
    #[default]
    Auto,
    Fixed(f32),
}

impl Quality {
    fn as_jpeg_quality(self) -> u8 {
        let q = match self {
            Quality::Auto => AUTO_QUALITY,
            Quality::Fixed(q) => q.clamp(0.01, 1.0),
        };
        (q * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

/// Per-call optimization parameters. Immutable once built.
#[derive(Debug, Clone, Copy)]
pub struct OptimizeOptions {
    /// Upper bound on both output dimensions, applied after rotation.
    pub max_dimension: u32,
    pub quality: Quality,
    pub rotation: Rotation,
    /// Apply the linear contrast transform when the frame is small enough.
    pub enhance_text: bool,
    pub contrast_factor: f32,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            max_dimension: 1600,
            quality: Quality::Auto,
            rotation: Rotation::None,
            enhance_text: false,
            contrast_factor: 1.0,
        }
    }
}

/// Optimize an image for OCR transport.
///
/// Decode, rotate, bound to `max_dimension` preserving aspect ratio, optionally
/// contrast-enhance, and re-encode as JPEG. On any decode or encode failure the
/// original blob is returned unchanged; this function never fails.
pub fn optimize(image: &ImageBlob, options: &OptimizeOptions) -> ImageBlob {
    match try_optimize(image, options) {
        Ok(optimized) => optimized,
        Err(e) => {
            debug!("image optimization failed, using original: {}", e);
            image.clone()
        }
    }
}

fn try_optimize(image: &ImageBlob, options: &OptimizeOptions) -> Result<ImageBlob, image::ImageError> {
    let decoded = image::load_from_memory(&image.data)?;

    let mut frame = match options.rotation {
        Rotation::None => decoded,
        Rotation::Cw90 => decoded.rotate90(),
        Rotation::Cw180 => decoded.rotate180(),
        Rotation::Cw270 => decoded.rotate270(),
    };

    let (width, height) = frame.dimensions();
    let max = options.max_dimension.max(1);
    if width.max(height) > max {
        frame = frame.resize(max, max, FilterType::CatmullRom);
    }

    if options.enhance_text {
        frame = enhance_contrast(frame, options.contrast_factor);
    }

    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, options.quality.as_jpeg_quality());
    frame.to_rgb8().write_with_encoder(encoder)?;

    Ok(ImageBlob::new(buffer, "image/jpeg"))
}

/// Linear contrast transform around the mid-point, per RGB channel.
///
/// Skipped above `CONTRAST_PIXEL_LIMIT` pixels to keep large captures fast.
fn enhance_contrast(frame: DynamicImage, factor: f32) -> DynamicImage {
    let (width, height) = frame.dimensions();
    if u64::from(width) * u64::from(height) >= CONTRAST_PIXEL_LIMIT {
        debug!(
            "skipping contrast pass for {}x{} frame (over pixel limit)",
            width, height
        );
        return frame;
    }

    let mut rgb = frame.to_rgb8();
    for pixel in rgb.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            let adjusted = (f32::from(*channel) - 128.0) * factor + 128.0;
            *channel = adjusted.clamp(0.0, 255.0) as u8;
        }
    }
    DynamicImage::ImageRgb8(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn png_blob(width: u32, height: u32) -> ImageBlob {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 100])
        });
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        ImageBlob::new(buffer, "image/png")
    }

    fn dimensions(blob: &ImageBlob) -> (u32, u32) {
        image::load_from_memory(&blob.data).unwrap().dimensions()
    }

    #[test]
    fn bounds_both_dimensions_preserving_aspect() {
        let blob = png_blob(400, 200);
        let out = optimize(
            &blob,
            &OptimizeOptions {
                max_dimension: 100,
                ..Default::default()
            },
        );
        assert_eq!(out.mime_type, "image/jpeg");
        assert_eq!(dimensions(&out), (100, 50));
    }

    #[test]
    fn rotation_swaps_dimensions_before_bound() {
        let blob = png_blob(400, 100);
        let out = optimize(
            &blob,
            &OptimizeOptions {
                max_dimension: 200,
                rotation: Rotation::Cw90,
                ..Default::default()
            },
        );
        // 400x100 rotated is 100x400; bounded to 200 -> 50x200.
        assert_eq!(dimensions(&out), (50, 200));
    }

    #[test]
    fn undecodable_input_returns_original() {
        let blob = ImageBlob::new(b"definitely not an image".to_vec(), "image/png");
        let out = optimize(&blob, &OptimizeOptions::default());
        assert_eq!(out, blob);
    }

    #[test]
    fn contrast_transform_clamps() {
        let blob = png_blob(16, 16);
        let out = optimize(
            &blob,
            &OptimizeOptions {
                enhance_text: true,
                contrast_factor: 3.0,
                ..Default::default()
            },
        );
        assert!(!out.data.is_empty());
        assert_eq!(out.mime_type, "image/jpeg");
    }
}

//! Transport size validation and iterative recompression.
//!
//! Backends reject payloads above a hard cap. Oversized captures are walked
//! down a fixed (quality, max dimension) ladder rather than searched: at most
//! four recompression attempts, monotonically more aggressive.

use thiserror::Error;
use tracing::debug;

use super::optimizer::{optimize, OptimizeOptions, Quality};
use super::ImageBlob;

/// Hard cap on the encoded transport size.
pub const SIZE_CAP_MB: f64 = 15.0;

/// Recompression target for oversized captures.
pub const TARGET_MB: f64 = 10.0;

/// Fixed recompression ladder: (quality, max dimension) per step.
const COMPRESSION_LADDER: [(f32, u32); 4] = [(0.8, 1400), (0.6, 1200), (0.4, 1000), (0.3, 800)];

/// Errors from size validation and recompression.
#[derive(Debug, Error)]
pub enum SizeError {
    #[error("image is {size_mb:.1}MB, over the {limit_mb:.0}MB limit")]
    Oversize { size_mb: f64, limit_mb: f64 },

    #[error("could not compress image under {target_mb:.0}MB")]
    CompressionExhausted { target_mb: f64 },
}

/// Validate the encoded size against the hard cap.
///
/// Returns the estimated size in MB on success.
pub fn check_size(image: &ImageBlob) -> Result<f64, SizeError> {
    let size_mb = image.estimated_size_mb();
    if size_mb > SIZE_CAP_MB {
        return Err(SizeError::Oversize {
            size_mb,
            limit_mb: SIZE_CAP_MB,
        });
    }
    Ok(size_mb)
}

/// Recompress an oversized image down to `target_mb`.
///
/// Each ladder step re-optimizes the *original* image at a lower quality and
/// dimension bound; the first result at or under target wins. Fails with
/// `CompressionExhausted` once the ladder runs out.
pub fn compress_to_target(image: &ImageBlob, target_mb: f64) -> Result<ImageBlob, SizeError> {
    for (step, (quality, max_dimension)) in COMPRESSION_LADDER.iter().enumerate() {
        let candidate = optimize(
            image,
            &OptimizeOptions {
                max_dimension: *max_dimension,
                quality: Quality::Fixed(*quality),
                ..Default::default()
            },
        );

        let size_mb = candidate.estimated_size_mb();
        debug!(
            "compression step {} (q={}, max={}): {:.2}MB",
            step + 1,
            quality,
            max_dimension,
            size_mb
        );

        if size_mb <= target_mb {
            return Ok(candidate);
        }
    }

    Err(SizeError::CompressionExhausted { target_mb })
}

//! Image handling for OCR transport.
//!
//! Captured screen regions arrive as encoded image payloads. Before they are
//! sent to an inference backend they are resized, rotated, optionally
//! contrast-enhanced and re-encoded as JPEG, then checked against the
//! transport size cap with iterative recompression when needed.

mod optimizer;
mod size_guard;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

pub use optimizer::{optimize, OptimizeOptions, Quality, Rotation};
pub use size_guard::{check_size, compress_to_target, SizeError, SIZE_CAP_MB, TARGET_MB};

/// An encoded image payload with its declared MIME type.
///
/// Blobs are never mutated; every transformation produces a new blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl ImageBlob {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    /// Parse a base64 payload, with or without a `data:*;base64,` prefix.
    pub fn from_base64(input: &str) -> Option<Self> {
        let (mime, payload) = match input.split_once(";base64,") {
            Some((header, payload)) => {
                let mime = header.strip_prefix("data:").unwrap_or(header);
                (mime.to_string(), payload)
            }
            None => ("image/png".to_string(), input),
        };
        let data = BASE64_STANDARD.decode(payload.trim()).ok()?;
        Some(Self::new(data, mime))
    }

    /// Base64 transport encoding of the payload.
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.data)
    }

    /// Length the payload would have in base64, without encoding it.
    pub fn base64_len(&self) -> usize {
        self.data.len().div_ceil(3) * 4
    }

    /// Estimated decoded transport size in megabytes.
    ///
    /// Matches the wire-side estimate: base64 length x 0.75 / 1 MiB.
    pub fn estimated_size_mb(&self) -> f64 {
        self.base64_len() as f64 * 0.75 / (1024.0 * 1024.0)
    }
}

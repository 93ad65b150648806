//! Inference backend abstraction.
//!
//! A backend turns an optimized image plus options into raw extracted text.
//! The orchestrator holds an ordered list of backends and tries them in
//! priority order; there is no inheritance between them, only this trait.

mod local;
mod prompts;
mod remote;

use async_trait::async_trait;
use thiserror::Error;

pub use local::{LocalModelBackend, LocalModelConfig};
pub use prompts::prompt_for;
pub use remote::{RemoteConfig, RemoteVisionBackend};

use crate::image::ImageBlob;
use crate::models::{BackendKind, Extraction, FieldType, Language, OcrMode};

/// Message fragments that mark a failure as transient.
const TEMPORARY_MARKERS: [&str; 7] = [
    "overload",
    "rate limit",
    "rate-limit",
    "timeout",
    "timed out",
    "resource exhausted",
    "try again",
];

/// Failures produced by an inference backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Backend cannot serve right now; the orchestrator silently falls
    /// through to the next backend in priority order.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Transient failure (rate limit, overload, timeout). Retried once with
    /// backoff before being surfaced.
    #[error("temporary backend failure: {0}")]
    Temporary(String),

    /// Non-retryable failure (bad credential, malformed request).
    #[error("backend request rejected: {0}")]
    Permanent(String),
}

impl BackendError {
    pub fn is_temporary(&self) -> bool {
        matches!(self, BackendError::Temporary(_))
    }

    /// Classify an HTTP failure: 429 and 5xx are temporary, everything else
    /// is permanent unless the body carries a transient marker.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            429 | 500..=599 => BackendError::Temporary(format!("HTTP {}: {}", status, message)),
            _ if message_is_temporary(&message) => {
                BackendError::Temporary(format!("HTTP {}: {}", status, message))
            }
            _ => BackendError::Permanent(format!("HTTP {}: {}", status, message)),
        }
    }

    /// Classify a transport-level failure by its message.
    pub fn from_message(message: String) -> Self {
        if message_is_temporary(&message) {
            BackendError::Temporary(message)
        } else {
            BackendError::Permanent(message)
        }
    }
}

fn message_is_temporary(message: &str) -> bool {
    let lowered = message.to_lowercase();
    TEMPORARY_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Options accompanying one extraction call.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub language: Language,
    pub mode: OcrMode,
    pub field_type: Option<FieldType>,
    /// Caller's model hint; backends map it onto their own model naming.
    pub model: String,
}

/// Common contract over local and remote inference providers.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn name(&self) -> &str;

    /// Whether the backend is configured and can accept a call right now.
    async fn is_ready(&self) -> bool;

    async fn extract_text(
        &self,
        image: &ImageBlob,
        options: &ExtractOptions,
    ) -> Result<Extraction, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_429_and_5xx_are_temporary() {
        assert!(BackendError::from_status(429, "slow down".into()).is_temporary());
        assert!(BackendError::from_status(503, "busy".into()).is_temporary());
        assert!(BackendError::from_status(500, "".into()).is_temporary());
    }

    #[test]
    fn other_4xx_is_permanent_unless_marked() {
        assert!(!BackendError::from_status(400, "API key not valid".into()).is_temporary());
        assert!(!BackendError::from_status(403, "forbidden".into()).is_temporary());
        assert!(BackendError::from_status(400, "model is overloaded".into()).is_temporary());
    }

    #[test]
    fn message_markers_classify_transport_errors() {
        assert!(BackendError::from_message("connection timed out".into()).is_temporary());
        assert!(BackendError::from_message("Rate limit exceeded".into()).is_temporary());
        assert!(!BackendError::from_message("invalid request body".into()).is_temporary());
    }
}

//! Request-level error taxonomy and user-facing message classification.

use thiserror::Error;

use crate::backends::BackendError;
use crate::image::SizeError;
use crate::models::FieldType;
use crate::throttle::ThrottleError;

/// Everything that can stop one request from producing a result.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The input payload could not be used at all.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Size(#[from] SizeError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Throttle(#[from] ThrottleError),

    /// A backend answered, but with no usable text.
    #[error("extraction produced no text")]
    EmptyResult { field: Option<FieldType> },

    /// The tab already has a request in flight.
    #[error("tab is already processing a request")]
    TabBusy,

    #[error("request cancelled")]
    Cancelled,
}

/// Map an error to one actionable sentence for the end user.
///
/// Keys off the error variant first, then message markers for backend
/// failures whose variant alone is too coarse.
pub fn user_message(error: &ProcessError) -> String {
    match error {
        ProcessError::InvalidInput(_) => {
            "The captured image could not be read. Try selecting the area again.".to_string()
        }
        ProcessError::Size(SizeError::Oversize { .. })
        | ProcessError::Size(SizeError::CompressionExhausted { .. }) => {
            "The captured image is too large to process. Try selecting a smaller area.".to_string()
        }
        ProcessError::Backend(e) => backend_message(e),
        ProcessError::Throttle(_) => {
            "The OCR service is not running. Restart and try again.".to_string()
        }
        ProcessError::EmptyResult { field } => empty_message(*field),
        ProcessError::TabBusy => {
            "This tab already has a capture in progress. Wait for it to finish.".to_string()
        }
        ProcessError::Cancelled => "The request was cancelled.".to_string(),
    }
}

fn backend_message(error: &BackendError) -> String {
    let detail = error.to_string().to_lowercase();

    if detail.contains("api key") || detail.contains("key not valid") || detail.contains("permission")
    {
        return "The API key looks invalid. Check it in the settings.".to_string();
    }
    if detail.contains("timeout") || detail.contains("timed out") {
        return "The OCR service did not respond in time. Try again.".to_string();
    }
    if error.is_temporary() {
        return "The OCR service is busy. Wait a moment and try again.".to_string();
    }
    if matches!(error, BackendError::Unavailable(_)) {
        return "No OCR service is reachable. Check your connection and settings.".to_string();
    }
    "Text extraction failed. Try again.".to_string()
}

fn empty_message(field: Option<FieldType>) -> String {
    match field {
        Some(FieldType::PhoneNumber) => {
            "No phone number was found in the selected area.".to_string()
        }
        Some(FieldType::PayeeName) => {
            "No company name was found in the selected area.".to_string()
        }
        Some(FieldType::Phonetic) => {
            "No readable text was found to produce a reading.".to_string()
        }
        _ => "No text was found in the selected area.".to_string(),
    }
}

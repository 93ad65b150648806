//! Domain types shared across the OCR pipeline.

use serde::{Deserialize, Serialize};

use crate::image::ImageBlob;

/// Recognition language requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ja,
    En,
    Multi,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Ja => "ja",
            Language::En => "en",
            Language::Multi => "multi",
        }
    }
}

/// Recognition mode: accuracy-first or latency-first.
///
/// The mode drives the image optimization defaults, not the backend choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrMode {
    #[default]
    Accurate,
    Fast,
}

impl OcrMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OcrMode::Accurate => "accurate",
            OcrMode::Fast => "fast",
        }
    }
}

/// Semantic category of the extraction target.
///
/// Drives prompt selection and the field-specific post-processing tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    PhoneNumber,
    PayeeName,
    Phonetic,
    Clipboard,
    Freeform,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::PhoneNumber => "phone-number",
            FieldType::PayeeName => "payee-name",
            FieldType::Phonetic => "phonetic",
            FieldType::Clipboard => "clipboard",
            FieldType::Freeform => "freeform",
        }
    }
}

/// Which kind of backend produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Remote,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Remote => "remote",
        }
    }
}

/// One OCR request as handed to the orchestrator. Constructed per call.
#[derive(Debug, Clone)]
pub struct OcrRequest {
    pub image: ImageBlob,
    pub language: Language,
    pub mode: OcrMode,
    pub field_type: Option<FieldType>,
    /// Model the caller prefers; backends may map it to their own naming.
    pub model: String,
}

/// Raw text extraction as returned by a backend, before post-processing.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    /// Backend-reported confidence in [0, 1].
    pub confidence: f32,
}

/// Final, post-processed result of one orchestrated request.
#[derive(Debug, Clone, Serialize)]
pub struct OcrOutcome {
    pub text: String,
    pub confidence: f32,
    pub source: BackendKind,
    pub processing_time_ms: u64,
    /// Secondary phone field extracted from a labeled payee-name response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

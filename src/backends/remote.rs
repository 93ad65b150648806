//! Remote vision-language API backend.
//!
//! POSTs the optimized image plus a field-specific prompt to a Gemini-style
//! `generateContent` endpoint. Each call races a 15 second timer; transient
//! failures get one retry with exponential backoff, everything else
//! propagates immediately.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{prompt_for, BackendError, ExtractOptions, InferenceBackend};
use crate::image::ImageBlob;
use crate::models::{BackendKind, Extraction};

/// Hard deadline raced against each remote call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// One extra attempt on temporary failures.
const MAX_RETRIES: u32 = 1;

const BACKOFF_BASE_MS: u64 = 1000;
const BACKOFF_FACTOR: f64 = 1.5;

/// Confidence reported for remote extractions; the API itself returns none.
const REMOTE_CONFIDENCE: f32 = 0.9;

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_timeout_secs() -> u64 {
    REQUEST_TIMEOUT.as_secs()
}

/// Configuration for the remote vision API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    Blob {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "topP")]
    top_p: f64,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Backend calling a remote vision-capable generation endpoint.
pub struct RemoteVisionBackend {
    client: Client,
    config: RemoteConfig,
    api_key: String,
}

impl RemoteVisionBackend {
    pub fn new(config: RemoteConfig, api_key: String) -> Self {
        Self {
            client: Client::new(),
            config,
            api_key,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    fn model_for(&self, options: &ExtractOptions) -> String {
        if options.model.is_empty() {
            self.config.model.clone()
        } else {
            options.model.clone()
        }
    }

    /// One generateContent call, deadline-raced. Losing the race abandons the
    /// request; it does not cancel the underlying transfer.
    async fn invoke(
        &self,
        image: &ImageBlob,
        prompt: &str,
        model: &str,
        api_key: &str,
    ) -> Result<String, BackendError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: prompt },
                    Part::Blob {
                        inline_data: InlineData {
                            mime_type: image.mime_type.clone(),
                            data: image.to_base64(),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.05,
                top_p: 0.97,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.config.endpoint, model, api_key
        );

        let send = self.client.post(&url).json(&request).send();
        let response = tokio::time::timeout(self.timeout(), send)
            .await
            .map_err(|_| BackendError::Temporary("remote inference call timed out".to_string()))?
            .map_err(|e| BackendError::from_message(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status.as_u16(), body));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Permanent(format!("malformed response: {}", e)))?;

        let text = parsed
            .candidates
            .and_then(|mut c| c.drain(..).next())
            .and_then(|c| c.content)
            .and_then(|c| c.parts)
            .and_then(|mut p| p.drain(..).next())
            .and_then(|p| p.text)
            .unwrap_or_default();

        Ok(text)
    }

    /// Verify a credential with a minimal text-only generation.
    pub async fn verify_api_key(&self, api_key: &str) -> Result<(), BackendError> {
        let request = serde_json::json!({
            "contents": [{ "parts": [{ "text": "ping" }] }],
            "generationConfig": { "temperature": 0.0 }
        });

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.config.endpoint, self.config.model, api_key
        );

        let send = self.client.post(&url).json(&request).send();
        let response = tokio::time::timeout(self.timeout(), send)
            .await
            .map_err(|_| BackendError::Temporary("key verification timed out".to_string()))?
            .map_err(|e| BackendError::from_message(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(BackendError::from_status(status.as_u16(), body))
    }
}

#[async_trait::async_trait]
impl InferenceBackend for RemoteVisionBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn name(&self) -> &str {
        "remote-vision"
    }

    async fn is_ready(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn extract_text(
        &self,
        image: &ImageBlob,
        options: &ExtractOptions,
    ) -> Result<Extraction, BackendError> {
        if self.api_key.is_empty() {
            return Err(BackendError::Unavailable("no API key configured".to_string()));
        }

        let model = self.model_for(options);
        let prompt = prompt_for(&model, options.field_type);

        let mut attempt = 0u32;
        loop {
            match self.invoke(image, prompt, &model, &self.api_key).await {
                Ok(text) => {
                    debug!("remote extraction returned {} chars", text.chars().count());
                    return Ok(Extraction {
                        text,
                        confidence: REMOTE_CONFIDENCE,
                    });
                }
                Err(e) if attempt < MAX_RETRIES && e.is_temporary() => {
                    let backoff = Duration::from_millis(
                        (BACKOFF_BASE_MS as f64 * BACKOFF_FACTOR.powi(attempt as i32)) as u64,
                    );
                    warn!("remote call failed ({}), retrying in {:?}", e, backoff);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

//! On-device model backend.
//!
//! Delegates to a locally running model server (Ollama-style API) with the
//! image attached to the generation request. The local path is strictly
//! best-effort: any failure, including empty output, maps to `Unavailable`
//! so the orchestrator falls through to the remote backend. Local calls are
//! never retried.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use super::{prompt_for, BackendError, ExtractOptions, InferenceBackend};
use crate::image::ImageBlob;
use crate::models::{BackendKind, Extraction};

/// Per-call deadline for local inference.
const INFERENCE_TIMEOUT: Duration = Duration::from_secs(60);

/// Polling interval while waiting for the model server to come up.
const READINESS_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Confidence reported for local extractions; the session returns none.
const LOCAL_CONFIDENCE: f32 = 0.7;

fn default_enabled() -> bool {
    false
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "gemma3:4b".to_string()
}

fn default_init_timeout_secs() -> u64 {
    300
}

/// Configuration for the on-device model session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalModelConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Full model initialization may include a download; five minutes.
    #[serde(default = "default_init_timeout_secs")]
    pub init_timeout_secs: u64,
}

impl Default for LocalModelConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            endpoint: default_endpoint(),
            model: default_model(),
            init_timeout_secs: default_init_timeout_secs(),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<String>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Backend delegating to an on-device model session.
pub struct LocalModelBackend {
    client: Client,
    config: LocalModelConfig,
}

impl LocalModelBackend {
    pub fn new(config: LocalModelConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn probe(&self) -> bool {
        let url = format!("{}/api/tags", self.config.endpoint);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Wait for the model session to become ready, bounded by the init
    /// deadline. Used after the engine requests a model load.
    pub async fn ensure_initialized(&self) -> Result<(), BackendError> {
        let deadline = Instant::now() + Duration::from_secs(self.config.init_timeout_secs);
        loop {
            if self.probe().await {
                info!("local model session is ready");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BackendError::Unavailable(
                    "local model failed to initialize within the deadline".to_string(),
                ));
            }
            tokio::time::sleep(READINESS_POLL_INTERVAL).await;
        }
    }
}

#[async_trait::async_trait]
impl InferenceBackend for LocalModelBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn name(&self) -> &str {
        "local-model"
    }

    async fn is_ready(&self) -> bool {
        self.config.enabled && self.probe().await
    }

    async fn extract_text(
        &self,
        image: &ImageBlob,
        options: &ExtractOptions,
    ) -> Result<Extraction, BackendError> {
        if !self.config.enabled {
            return Err(BackendError::Unavailable("local model disabled".to_string()));
        }

        let prompt = prompt_for(&self.config.model, options.field_type);
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            images: vec![image.to_base64()],
            stream: false,
            options: GenerateOptions {
                temperature: 0.1,
                num_predict: 1024,
            },
        };

        let url = format!("{}/api/generate", self.config.endpoint);
        let send = self.client.post(&url).json(&request).send();
        let response = tokio::time::timeout(INFERENCE_TIMEOUT, send)
            .await
            .map_err(|_| BackendError::Unavailable("local inference timed out".to_string()))?
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BackendError::Unavailable(format!(
                "local model returned HTTP {}",
                response.status()
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Unavailable(format!("malformed local response: {}", e)))?;

        let text = parsed.response.trim().to_string();
        if text.is_empty() {
            return Err(BackendError::Unavailable(
                "local model returned empty output".to_string(),
            ));
        }

        debug!("local extraction returned {} chars", text.chars().count());
        Ok(Extraction {
            text,
            confidence: LOCAL_CONFIDENCE,
        })
    }
}

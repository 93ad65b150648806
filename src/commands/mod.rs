//! Command surface: tagged JSON commands in, JSON responses out.
//!
//! The engine owns the long-lived collaborators (settings store, cache,
//! throttler, tab tracker) and builds the per-request pieces on dispatch,
//! backends included, so every request sees the current settings snapshot.
//! Every failure is folded into a response with `success: false` and a
//! user-facing message; `handle` itself never fails.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backends::{InferenceBackend, LocalModelBackend, LocalModelConfig, RemoteVisionBackend};
use crate::cache::ResultCache;
use crate::config::{Settings, SettingsStore};
use crate::image::ImageBlob;
use crate::models::{FieldType, OcrOutcome, OcrRequest};
use crate::orchestrator::{user_message, OcrOrchestrator, ProcessError};
use crate::session::TabSessionTracker;
use crate::throttle::RequestThrottler;

/// Commands accepted over the message surface.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    #[serde(rename = "processImage", rename_all = "camelCase")]
    ProcessImage {
        /// Base64 payload, with or without a data-URL prefix.
        image_data: String,
        #[serde(default)]
        field: Option<FieldType>,
        #[serde(default)]
        tab_id: Option<i64>,
    },

    /// Run the full pipeline against a synthetic image.
    #[serde(rename = "testOCR")]
    TestOcr,

    #[serde(rename = "getOCRStatus")]
    GetOcrStatus,

    #[serde(rename = "clearCache")]
    ClearCache,

    #[serde(rename = "testApiKey", rename_all = "camelCase")]
    TestApiKey { api_key: String },
}

/// Availability snapshot for the status command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub local_llm_available: bool,
    pub gemini_api_available: bool,
    /// Which backend the next request would try first.
    pub current_priority: String,
    pub local_llm_status: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CommandResponse {
    Ocr {
        success: bool,
        #[serde(flatten)]
        outcome: OcrOutcome,
    },
    Status {
        success: bool,
        #[serde(flatten)]
        status: StatusReport,
    },
    TestOcr {
        success: bool,
        /// Which backend served the probe.
        method: String,
        /// Probe round-trip in milliseconds.
        time: u64,
    },
    Ack {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Error {
        success: bool,
        error: String,
    },
}

impl CommandResponse {
    fn ocr(outcome: OcrOutcome) -> Self {
        CommandResponse::Ocr {
            success: true,
            outcome,
        }
    }

    fn ack(message: impl Into<Option<String>>) -> Self {
        CommandResponse::Ack {
            success: true,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        CommandResponse::Error {
            success: false,
            error: message.into(),
        }
    }
}

/// Long-lived command dispatcher.
pub struct CommandEngine {
    settings: Arc<SettingsStore>,
    cache: Arc<ResultCache>,
    sessions: Arc<TabSessionTracker>,
    throttler: Arc<RequestThrottler>,
    seen_revision: AtomicU64,
}

impl CommandEngine {
    pub async fn new(settings: Arc<SettingsStore>) -> Result<Self, crate::config::ConfigError> {
        let current = settings.current().await?;

        if current.local.enabled && !current.local_model_initialized {
            spawn_local_init(settings.clone(), current.local.clone());
        }

        Ok(Self {
            settings,
            cache: Arc::new(ResultCache::new()),
            sessions: Arc::new(TabSessionTracker::new()),
            throttler: Arc::new(RequestThrottler::new()),
            seen_revision: AtomicU64::new(0),
        })
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn sessions(&self) -> &Arc<TabSessionTracker> {
        &self.sessions
    }

    /// Dispatch one command. Failures become error responses, never panics
    /// or propagated errors.
    pub async fn handle(&self, command: Command) -> CommandResponse {
        self.invalidate_on_settings_change().await;

        match command {
            Command::ProcessImage {
                image_data,
                field,
                tab_id,
            } => self.process_image(&image_data, field, tab_id).await,
            Command::TestOcr => self.test_ocr().await,
            Command::GetOcrStatus => self.status().await,
            Command::ClearCache => {
                self.cache.clear().await;
                CommandResponse::ack(Some("cache cleared".to_string()))
            }
            Command::TestApiKey { api_key } => self.test_api_key(&api_key).await,
        }
    }

    /// Drop cached results once per OCR-affecting settings change.
    async fn invalidate_on_settings_change(&self) {
        let revision = self.settings.revision().await;
        let seen = self.seen_revision.swap(revision, Ordering::Relaxed);
        if revision != seen {
            info!("settings revision {} -> {}, clearing result cache", seen, revision);
            self.cache.clear().await;
        }
    }

    async fn process_image(
        &self,
        image_data: &str,
        field: Option<FieldType>,
        tab_id: Option<i64>,
    ) -> CommandResponse {
        if let Some(tab) = tab_id {
            if !self.sessions.begin(tab).await {
                return CommandResponse::error(user_message(&ProcessError::TabBusy));
            }
        }

        let response = self.run_pipeline(image_data, field).await;

        if let Some(tab) = tab_id {
            self.sessions.finish(tab).await;
        }
        response
    }

    async fn run_pipeline(&self, image_data: &str, field: Option<FieldType>) -> CommandResponse {
        let image = match ImageBlob::from_base64(image_data) {
            Some(image) => image,
            None => {
                warn!("rejecting undecodable image payload");
                return CommandResponse::error(user_message(&ProcessError::InvalidInput(
                    "undecodable base64 payload".to_string(),
                )));
            }
        };

        let settings = match self.settings.current().await {
            Ok(settings) => settings,
            Err(e) => return CommandResponse::error(format!("failed to load settings: {}", e)),
        };

        let orchestrator = OcrOrchestrator::new(
            build_backends(&settings),
            self.throttler.clone(),
            self.cache.clone(),
        );

        let request = OcrRequest {
            image,
            language: settings.language,
            mode: settings.mode,
            field_type: field,
            model: settings.model.clone(),
        };

        match orchestrator.process(request).await {
            Ok(outcome) => CommandResponse::ocr(outcome),
            Err(e) => {
                debug!("pipeline failed: {}", e);
                CommandResponse::error(user_message(&e))
            }
        }
    }

    /// End-to-end smoke check with a locally generated image.
    async fn test_ocr(&self) -> CommandResponse {
        let image = synthetic_test_image();
        match self.run_pipeline(&image.to_base64(), None).await {
            CommandResponse::Ocr { outcome, .. } => CommandResponse::TestOcr {
                success: true,
                method: outcome.source.as_str().to_string(),
                time: outcome.processing_time_ms,
            },
            other => other,
        }
    }

    async fn status(&self) -> CommandResponse {
        let settings = match self.settings.current().await {
            Ok(settings) => settings,
            Err(e) => return CommandResponse::error(format!("failed to load settings: {}", e)),
        };

        let local = LocalModelBackend::new(settings.local.clone());
        let local_ready = settings.local.enabled && local.is_ready().await;
        let local_status = if !settings.local.enabled {
            "disabled"
        } else if local_ready {
            "ready"
        } else {
            "initializing"
        };

        CommandResponse::Status {
            success: true,
            status: StatusReport {
                local_llm_available: local_ready,
                gemini_api_available: !settings.api_key.trim().is_empty(),
                current_priority: if local_ready { "local" } else { "remote" }.to_string(),
                local_llm_status: local_status.to_string(),
            },
        }
    }

    async fn test_api_key(&self, api_key: &str) -> CommandResponse {
        if api_key.trim().is_empty() {
            return CommandResponse::error("API key is empty.");
        }
        let settings = match self.settings.current().await {
            Ok(settings) => settings,
            Err(e) => return CommandResponse::error(format!("failed to load settings: {}", e)),
        };
        let backend = RemoteVisionBackend::new(settings.remote.clone(), api_key.to_string());
        match backend.verify_api_key(api_key).await {
            Ok(()) => CommandResponse::ack(Some("API key is valid".to_string())),
            Err(e) => CommandResponse::error(user_message(&ProcessError::Backend(e))),
        }
    }
}

/// Priority-ordered backends for one request, built from the given settings
/// snapshot so config edits take effect on the next call.
fn build_backends(settings: &Settings) -> Vec<Arc<dyn InferenceBackend>> {
    let mut backends: Vec<Arc<dyn InferenceBackend>> = Vec::with_capacity(2);
    if settings.local.enabled {
        backends.push(Arc::new(LocalModelBackend::new(settings.local.clone())));
    }
    backends.push(Arc::new(RemoteVisionBackend::new(
        settings.remote.clone(),
        settings.api_key.clone(),
    )));
    backends
}

/// Wait for the local model session in the background and record a completed
/// initialization so later startups skip the wait.
fn spawn_local_init(settings: Arc<SettingsStore>, config: LocalModelConfig) {
    tokio::spawn(async move {
        let local = LocalModelBackend::new(config);
        match local.ensure_initialized().await {
            Ok(()) => {
                if let Err(e) = settings.mark_local_model_initialized().await {
                    warn!("failed to record local model initialization: {}", e);
                }
            }
            Err(e) => warn!("local model initialization failed: {}", e),
        }
    });
}

/// Small high-contrast frame for the self-test path.
fn synthetic_test_image() -> ImageBlob {
    use image::{DynamicImage, RgbImage};

    let img = RgbImage::from_fn(64, 32, |x, _| {
        if (x / 8) % 2 == 0 {
            image::Rgb([0, 0, 0])
        } else {
            image::Rgb([255, 255, 255])
        }
    });
    let mut buffer = Vec::new();
    // Encoding an in-memory RGB frame to PNG cannot fail.
    if DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
        .is_err()
    {
        return ImageBlob::new(Vec::new(), "image/png");
    }
    ImageBlob::new(buffer, "image/png")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BackendKind;

    #[test]
    fn commands_deserialize_from_tagged_json() {
        let cmd: Command = serde_json::from_str(
            r#"{"type":"processImage","imageData":"aGVsbG8=","field":"phone-number","tabId":7}"#,
        )
        .unwrap();
        match cmd {
            Command::ProcessImage {
                image_data,
                field,
                tab_id,
            } => {
                assert_eq!(image_data, "aGVsbG8=");
                assert_eq!(field, Some(FieldType::PhoneNumber));
                assert_eq!(tab_id, Some(7));
            }
            other => panic!("wrong variant: {:?}", other),
        }

        assert!(matches!(
            serde_json::from_str::<Command>(r#"{"type":"getOCRStatus"}"#).unwrap(),
            Command::GetOcrStatus
        ));
        assert!(matches!(
            serde_json::from_str::<Command>(r#"{"type":"testOCR"}"#).unwrap(),
            Command::TestOcr
        ));
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(serde_json::from_str::<Command>(r#"{"type":"doMagic"}"#).is_err());
    }

    #[test]
    fn status_serializes_camel_case() {
        let response = CommandResponse::Status {
            success: true,
            status: StatusReport {
                local_llm_available: false,
                gemini_api_available: true,
                current_priority: "remote".to_string(),
                local_llm_status: "disabled".to_string(),
            },
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["geminiApiAvailable"], true);
        assert_eq!(json["currentPriority"], "remote");
    }

    #[test]
    fn test_ocr_response_shape() {
        let json = serde_json::to_value(CommandResponse::TestOcr {
            success: true,
            method: "remote".to_string(),
            time: 42,
        })
        .unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["method"], "remote");
        assert_eq!(json["time"], 42);
    }

    #[test]
    fn error_response_carries_message() {
        let json = serde_json::to_value(CommandResponse::error("nope")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "nope");
    }

    #[test]
    fn synthetic_image_is_decodable() {
        let blob = synthetic_test_image();
        assert!(image::load_from_memory(&blob.data).is_ok());
    }

    #[test]
    fn backends_follow_the_settings_snapshot() {
        let mut settings = Settings::default();
        let backends = build_backends(&settings);
        assert_eq!(backends.len(), 1);
        assert_eq!(backends[0].kind(), BackendKind::Remote);

        settings.local.enabled = true;
        settings.local.model = "gemma3:12b".to_string();
        let backends = build_backends(&settings);
        assert_eq!(backends.len(), 2);
        assert_eq!(backends[0].kind(), BackendKind::Local);
        assert_eq!(backends[1].kind(), BackendKind::Remote);
    }

    #[tokio::test]
    async fn api_key_change_clears_cached_results() {
        let dir = std::env::temp_dir().join(format!("fieldsnap-cmd-{}", std::process::id()));
        let path = dir.join("config.toml");
        let store = Arc::new(SettingsStore::open(path).unwrap());
        let engine = CommandEngine::new(store.clone()).await.unwrap();

        engine.handle(Command::ClearCache).await;
        engine
            .cache()
            .put(
                "fp".to_string(),
                crate::cache::CachedResult {
                    text: "cached".to_string(),
                    confidence: 0.9,
                    source: BackendKind::Remote,
                    phone: None,
                },
            )
            .await;
        assert_eq!(engine.cache().len().await, 1);

        let mut settings = store.current().await.unwrap();
        settings.api_key = "rotated-key".to_string();
        store.update(settings).await.unwrap();

        engine.handle(Command::GetOcrStatus).await;
        assert!(engine.cache().is_empty().await);

        let _ = std::fs::remove_dir_all(dir);
    }
}

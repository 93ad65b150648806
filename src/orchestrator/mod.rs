//! OCR request orchestration.
//!
//! One request flows: cache lookup, image optimization, size guard, backend
//! attempts in priority order (local first when ready, remote through the
//! throttler), post-processing, cache store. Backends are a flat priority
//! list behind the `InferenceBackend` trait; fallback is composition, not
//! inheritance.

mod errors;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use errors::{user_message, ProcessError};

use crate::backends::{BackendError, ExtractOptions, InferenceBackend};
use crate::cache::{fingerprint, CachedResult, ResultCache};
use crate::image::{check_size, compress_to_target, optimize, ImageBlob, OptimizeOptions, Quality, SizeError, TARGET_MB};
use crate::models::{BackendKind, Extraction, FieldType, OcrMode, OcrOutcome, OcrRequest};
use crate::postprocess::{post_process, split_labeled_fields};
use crate::throttle::RequestThrottler;

/// Cooperative cancellation flag, checked at coarse request boundaries.
///
/// Setting it does not abort in-flight I/O; it only stops the result from
/// being applied once the current stage returns.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Progress events emitted best-effort during processing.
///
/// Dispatch failures are discarded; a dead listener must never mask the
/// primary result.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Started { request_id: Uuid },
    CacheHit { request_id: Uuid },
    ImageOptimized { request_id: Uuid, size_mb: f64 },
    BackendAttempt { request_id: Uuid, backend: String },
    BackendFailed {
        request_id: Uuid,
        backend: String,
        error: String,
    },
    Completed {
        request_id: Uuid,
        source: BackendKind,
        processing_time_ms: u64,
    },
    Failed { request_id: Uuid, error: String },
}

/// Orchestrates one OCR request across optimization, backends and cache.
pub struct OcrOrchestrator {
    backends: Vec<Arc<dyn InferenceBackend>>,
    throttler: Arc<RequestThrottler>,
    cache: Arc<ResultCache>,
    events: Option<mpsc::Sender<ProgressEvent>>,
}

impl OcrOrchestrator {
    /// Build an orchestrator over a priority-ordered backend list.
    pub fn new(
        backends: Vec<Arc<dyn InferenceBackend>>,
        throttler: Arc<RequestThrottler>,
        cache: Arc<ResultCache>,
    ) -> Self {
        Self {
            backends,
            throttler,
            cache,
            events: None,
        }
    }

    /// Attach a best-effort progress event sink.
    pub fn with_events(mut self, events: mpsc::Sender<ProgressEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(event);
        }
    }

    /// Process one request end to end.
    pub async fn process(&self, request: OcrRequest) -> Result<OcrOutcome, ProcessError> {
        self.process_with_cancel(request, &CancelFlag::new()).await
    }

    pub async fn process_with_cancel(
        &self,
        request: OcrRequest,
        cancel: &CancelFlag,
    ) -> Result<OcrOutcome, ProcessError> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        self.emit(ProgressEvent::Started { request_id });

        let result = self.run(request_id, request, cancel, started).await;
        match &result {
            Ok(outcome) => self.emit(ProgressEvent::Completed {
                request_id,
                source: outcome.source,
                processing_time_ms: outcome.processing_time_ms,
            }),
            Err(e) => self.emit(ProgressEvent::Failed {
                request_id,
                error: e.to_string(),
            }),
        }
        result
    }

    async fn run(
        &self,
        request_id: Uuid,
        request: OcrRequest,
        cancel: &CancelFlag,
        started: Instant,
    ) -> Result<OcrOutcome, ProcessError> {
        if request.image.data.is_empty() {
            return Err(ProcessError::InvalidInput("empty image payload".to_string()));
        }

        let key = fingerprint(
            &request.image,
            request.field_type,
            request.language,
            request.mode,
            &request.model,
        );

        if let Some(hit) = self.cache.get(&key).await {
            debug!("cache hit for request {}", request_id);
            self.emit(ProgressEvent::CacheHit { request_id });
            return Ok(OcrOutcome {
                text: hit.text,
                confidence: hit.confidence,
                source: hit.source,
                processing_time_ms: started.elapsed().as_millis() as u64,
                phone: hit.phone,
            });
        }

        let optimized = self.prepare_image(request_id, &request).await?;
        if cancel.is_cancelled() {
            return Err(ProcessError::Cancelled);
        }

        let options = ExtractOptions {
            language: request.language,
            mode: request.mode,
            field_type: request.field_type,
            model: request.model.clone(),
        };

        let (extraction, source) = self
            .try_backends(request_id, &optimized, &options, cancel)
            .await?;

        if cancel.is_cancelled() {
            // Late completion: drop the result instead of applying it.
            debug!("request {} cancelled, dropping result", request_id);
            return Err(ProcessError::Cancelled);
        }

        if extraction.text.trim().is_empty() {
            return Err(ProcessError::EmptyResult {
                field: request.field_type,
            });
        }

        let (text, phone) = structure_result(&extraction.text, request.field_type);

        self.cache
            .put(
                key,
                CachedResult {
                    text: text.clone(),
                    confidence: extraction.confidence,
                    source,
                    phone: phone.clone(),
                },
            )
            .await;

        info!(
            "request {} completed via {} in {}ms",
            request_id,
            source.as_str(),
            started.elapsed().as_millis()
        );

        Ok(OcrOutcome {
            text,
            confidence: extraction.confidence,
            source,
            processing_time_ms: started.elapsed().as_millis() as u64,
            phone,
        })
    }

    /// Optimize per mode defaults, then enforce the transport size cap with
    /// recompression when needed.
    async fn prepare_image(
        &self,
        request_id: Uuid,
        request: &OcrRequest,
    ) -> Result<ImageBlob, ProcessError> {
        let opts = optimize_options_for(request.mode);
        let image = request.image.clone();
        let optimized = tokio::task::spawn_blocking(move || optimize(&image, &opts))
            .await
            .map_err(|e| ProcessError::InvalidInput(format!("optimization task failed: {}", e)))?;

        let optimized = match check_size(&optimized) {
            Ok(size_mb) => {
                self.emit(ProgressEvent::ImageOptimized {
                    request_id,
                    size_mb,
                });
                optimized
            }
            Err(SizeError::Oversize { size_mb, .. }) => {
                warn!("image is {:.1}MB, compressing to {:.0}MB", size_mb, TARGET_MB);
                let oversized = optimized.clone();
                let compressed =
                    tokio::task::spawn_blocking(move || compress_to_target(&oversized, TARGET_MB))
                        .await
                        .map_err(|e| {
                            ProcessError::InvalidInput(format!("compression task failed: {}", e))
                        })??;
                let size_mb = check_size(&compressed)?;
                self.emit(ProgressEvent::ImageOptimized {
                    request_id,
                    size_mb,
                });
                compressed
            }
            Err(e) => return Err(e.into()),
        };

        Ok(optimized)
    }

    /// Try backends in priority order.
    ///
    /// Local failures (including empty output) fall through silently; the
    /// remote backend runs through the throttler and its error, if any, is
    /// the one surfaced.
    async fn try_backends(
        &self,
        request_id: Uuid,
        image: &ImageBlob,
        options: &ExtractOptions,
        cancel: &CancelFlag,
    ) -> Result<(Extraction, BackendKind), ProcessError> {
        let mut last_error: Option<ProcessError> = None;

        for backend in &self.backends {
            if cancel.is_cancelled() {
                return Err(ProcessError::Cancelled);
            }

            let name = backend.name().to_string();
            match backend.kind() {
                BackendKind::Local => {
                    if !backend.is_ready().await {
                        debug!("skipping {}: not ready", name);
                        continue;
                    }
                    self.emit(ProgressEvent::BackendAttempt {
                        request_id,
                        backend: name.clone(),
                    });
                    match backend.extract_text(image, options).await {
                        Ok(extraction) if !extraction.text.trim().is_empty() => {
                            return Ok((extraction, BackendKind::Local));
                        }
                        Ok(_) => {
                            debug!("{} returned empty output, falling through", name);
                            self.emit(ProgressEvent::BackendFailed {
                                request_id,
                                backend: name,
                                error: "empty output".to_string(),
                            });
                        }
                        Err(e) => {
                            debug!("{} failed ({}), falling through", name, e);
                            self.emit(ProgressEvent::BackendFailed {
                                request_id,
                                backend: name,
                                error: e.to_string(),
                            });
                        }
                    }
                }
                BackendKind::Remote => {
                    self.emit(ProgressEvent::BackendAttempt {
                        request_id,
                        backend: name.clone(),
                    });
                    let backend = Arc::clone(backend);
                    let image = image.clone();
                    let opts = options.clone();
                    let result = self
                        .throttler
                        .execute(move || async move { backend.extract_text(&image, &opts).await })
                        .await?;

                    match result {
                        Ok(extraction) => return Ok((extraction, BackendKind::Remote)),
                        Err(e) => {
                            warn!("{} failed: {}", name, e);
                            self.emit(ProgressEvent::BackendFailed {
                                request_id,
                                backend: name,
                                error: e.to_string(),
                            });
                            last_error = Some(e.into());
                        }
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ProcessError::Backend(BackendError::Unavailable(
                "no inference backend available".to_string(),
            ))
        }))
    }
}

/// Mode-driven optimization defaults.
///
/// Both modes enhance text; accurate pushes contrast and resolution harder.
fn optimize_options_for(mode: OcrMode) -> OptimizeOptions {
    match mode {
        OcrMode::Accurate => OptimizeOptions {
            max_dimension: 1600,
            quality: Quality::Fixed(0.9),
            enhance_text: true,
            contrast_factor: 1.3,
            ..Default::default()
        },
        OcrMode::Fast => OptimizeOptions {
            max_dimension: 1024,
            quality: Quality::Fixed(0.8),
            enhance_text: true,
            contrast_factor: 1.1,
            ..Default::default()
        },
    }
}

/// Apply the field tail: payee-name responses carry two labeled sub-fields
/// parsed from one free-text answer, everything else is a single field.
fn structure_result(raw: &str, field_type: Option<FieldType>) -> (String, Option<String>) {
    match field_type {
        Some(FieldType::PayeeName) => {
            let (company_raw, phone_raw) = split_labeled_fields(raw);
            let company = post_process(&company_raw, Some(FieldType::PayeeName));
            let phone = post_process(&phone_raw, Some(FieldType::PhoneNumber));
            (company, Some(phone))
        }
        field => (post_process(raw, field), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Language;

    #[test]
    fn accurate_mode_pushes_contrast() {
        let opts = optimize_options_for(OcrMode::Accurate);
        assert!(opts.enhance_text);
        assert!((opts.contrast_factor - 1.3).abs() < f32::EPSILON);

        let fast = optimize_options_for(OcrMode::Fast);
        assert!((fast.contrast_factor - 1.1).abs() < f32::EPSILON);
        assert!(fast.max_dimension < opts.max_dimension);
    }

    #[test]
    fn payee_result_splits_labeled_fields() {
        let raw = "会社名: 株式会社テスト\n電話番号: ０３１２３４５６７８";
        let (company, phone) = structure_result(raw, Some(FieldType::PayeeName));
        assert_eq!(company, "テスト");
        assert_eq!(phone.as_deref(), Some("03-1234-5678"));
    }

    #[test]
    fn payee_result_without_labels_keeps_company_only() {
        let (company, phone) = structure_result("テスト商事", Some(FieldType::PayeeName));
        assert_eq!(company, "テスト商事");
        assert_eq!(phone.as_deref(), Some(""));
    }

    #[test]
    fn cancel_flag_is_sticky() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
    }

    #[tokio::test]
    async fn empty_payload_is_invalid_input() {
        let orchestrator = OcrOrchestrator::new(
            Vec::new(),
            Arc::new(RequestThrottler::with_interval(std::time::Duration::from_millis(1))),
            Arc::new(ResultCache::new()),
        );
        let request = OcrRequest {
            image: ImageBlob::new(Vec::new(), "image/png"),
            language: Language::Ja,
            mode: OcrMode::Fast,
            field_type: None,
            model: "m".to_string(),
        };
        let err = orchestrator.process(request).await.unwrap_err();
        assert!(matches!(err, ProcessError::InvalidInput(_)));
    }
}

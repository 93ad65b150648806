//! Content-addressed memoization of orchestration results.
//!
//! Keys are a digest over the request's semantically relevant fields; values
//! are the post-processed text plus the backend that produced it. Bounded
//! capacity with insertion-order FIFO eviction (deliberately not LRU), and a
//! wholesale clear when OCR-affecting settings change.

use std::collections::{HashMap, VecDeque};

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

use crate::image::ImageBlob;
use crate::models::{BackendKind, FieldType, Language, OcrMode};

/// Maximum number of cached results.
pub const CACHE_CAPACITY: usize = 30;

/// How many leading characters of the base64 payload go into the fingerprint.
const FINGERPRINT_PREFIX_CHARS: usize = 100;

/// A memoized result.
#[derive(Debug, Clone)]
pub struct CachedResult {
    pub text: String,
    pub confidence: f32,
    pub source: BackendKind,
    /// Secondary phone sub-field for payee-name requests.
    pub phone: Option<String>,
}

/// Deterministic digest over a request's cache-relevant fields.
pub fn fingerprint(
    image: &ImageBlob,
    field_type: Option<FieldType>,
    language: Language,
    mode: OcrMode,
    model: &str,
) -> String {
    let encoded = image.to_base64();
    let prefix: String = encoded.chars().take(FINGERPRINT_PREFIX_CHARS).collect();

    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(field_type.map(|f| f.as_str()).unwrap_or("none").as_bytes());
    hasher.update(language.as_str().as_bytes());
    hasher.update(mode.as_str().as_bytes());
    hasher.update(model.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CachedResult>,
    insertion_order: VecDeque<String>,
}

/// Bounded FIFO result cache. Process-wide singleton, injected by `Arc`.
pub struct ResultCache {
    capacity: usize,
    inner: RwLock<CacheInner>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::with_capacity(CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(CacheInner::default()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<CachedResult> {
        self.inner.read().await.entries.get(key).cloned()
    }

    /// Insert a result, evicting the oldest-inserted entry beyond capacity.
    pub async fn put(&self, key: String, result: CachedResult) {
        let mut inner = self.inner.write().await;

        if inner.entries.insert(key.clone(), result).is_none() {
            inner.insertion_order.push_back(key);
        }

        while inner.entries.len() > self.capacity {
            if let Some(oldest) = inner.insertion_order.pop_front() {
                inner.entries.remove(&oldest);
                debug!("evicted oldest cache entry");
            } else {
                break;
            }
        }
    }

    /// Drop every entry. Called when OCR-affecting settings change.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        let dropped = inner.entries.len();
        inner.entries.clear();
        inner.insertion_order.clear();
        debug!("cleared {} cached results", dropped);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str) -> CachedResult {
        CachedResult {
            text: text.to_string(),
            confidence: 0.9,
            source: BackendKind::Remote,
            phone: None,
        }
    }

    #[tokio::test]
    async fn put_beyond_capacity_evicts_oldest() {
        let cache = ResultCache::with_capacity(3);
        for i in 0..4 {
            cache.put(format!("key-{}", i), entry(&format!("v{}", i))).await;
        }

        assert_eq!(cache.len().await, 3);
        assert!(cache.get("key-0").await.is_none());
        assert!(cache.get("key-1").await.is_some());
        assert!(cache.get("key-3").await.is_some());
    }

    #[tokio::test]
    async fn overwrite_does_not_grow_order_queue() {
        let cache = ResultCache::with_capacity(2);
        cache.put("a".into(), entry("1")).await;
        cache.put("a".into(), entry("2")).await;
        cache.put("b".into(), entry("3")).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("a").await.unwrap().text, "2");
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let cache = ResultCache::new();
        cache.put("a".into(), entry("1")).await;
        cache.put("b".into(), entry("2")).await;
        cache.clear().await;

        assert!(cache.is_empty().await);
        assert!(cache.get("a").await.is_none());
    }

    #[test]
    fn fingerprint_depends_on_all_fields() {
        let image = ImageBlob::new(vec![7u8; 256], "image/png");
        let base = fingerprint(&image, Some(FieldType::PhoneNumber), Language::Ja, OcrMode::Accurate, "m1");

        let same = fingerprint(&image, Some(FieldType::PhoneNumber), Language::Ja, OcrMode::Accurate, "m1");
        assert_eq!(base, same);

        let other_field = fingerprint(&image, Some(FieldType::PayeeName), Language::Ja, OcrMode::Accurate, "m1");
        assert_ne!(base, other_field);

        let other_mode = fingerprint(&image, Some(FieldType::PhoneNumber), Language::Ja, OcrMode::Fast, "m1");
        assert_ne!(base, other_mode);

        let other_model = fingerprint(&image, Some(FieldType::PhoneNumber), Language::Ja, OcrMode::Accurate, "m2");
        assert_ne!(base, other_model);

        let other_image = ImageBlob::new(vec![8u8; 256], "image/png");
        let other = fingerprint(&other_image, Some(FieldType::PhoneNumber), Language::Ja, OcrMode::Accurate, "m1");
        assert_ne!(base, other);
    }
}

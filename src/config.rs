//! Settings persistence and the shared settings store.
//!
//! Settings live in a TOML file under the user config directory. The store
//! keeps a cached copy with a short staleness window so hot paths do not hit
//! the filesystem per request, plus a revision counter so dependents (the
//! result cache) can detect OCR-affecting changes.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::backends::{LocalModelConfig, RemoteConfig};
use crate::models::{Language, OcrMode};

/// How long a loaded settings snapshot stays fresh.
pub const SETTINGS_TTL: Duration = Duration::from_secs(30);

/// Environment variables that override the stored API key, in priority order.
const API_KEY_ENV_VARS: &[&str] = &["FIELDSNAP_API_KEY", "GEMINI_API_KEY"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot determine config directory")]
    NoConfigDir,

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

/// User-facing settings, persisted as TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Remote API key. Overridden by environment when set.
    pub api_key: String,
    pub language: Language,
    pub mode: OcrMode,
    /// Preferred model; backends map it to their own naming.
    pub model: String,
    /// Set once the local model has completed a full initialization.
    pub local_model_initialized: bool,
    /// When cached results were last invalidated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cache_invalidation: Option<DateTime<Utc>>,
    pub local: LocalModelConfig,
    pub remote: RemoteConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            language: Language::default(),
            mode: OcrMode::default(),
            model: default_model(),
            local_model_initialized: false,
            last_cache_invalidation: None,
            local: LocalModelConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

impl Settings {
    /// Default on-disk location: `<config dir>/fieldsnap/config.toml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let base = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(base.join("fieldsnap").join("config.toml"))
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut settings = Self::load_raw(path)?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Load exactly what is on disk, without environment overrides.
    fn load_raw(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(toml::from_str(&raw)?)
        } else {
            debug!("no config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Persist to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let raw = toml::to_string_pretty(self)?;
        fs::write(path, raw).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) {
        for var in API_KEY_ENV_VARS {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    debug!("api key taken from {}", var);
                    self.api_key = value.trim().to_string();
                    return;
                }
            }
        }
    }

    /// True when this change invalidates cached OCR results.
    pub fn affects_ocr(&self, other: &Settings) -> bool {
        self.api_key != other.api_key
            || self.language != other.language
            || self.mode != other.mode
            || self.model != other.model
            || self.local.enabled != other.local.enabled
            || self.local.endpoint != other.local.endpoint
            || self.local.model != other.local.model
            || self.remote.model != other.remote.model
    }
}

struct StoreInner {
    settings: Settings,
    loaded_at: Instant,
    revision: u64,
    last_change: Option<DateTime<Utc>>,
}

/// Shared settings store with a staleness window.
///
/// Process-wide singleton, injected by `Arc` into whatever needs settings.
pub struct SettingsStore {
    path: PathBuf,
    inner: RwLock<StoreInner>,
}

impl SettingsStore {
    pub fn open(path: PathBuf) -> Result<Self, ConfigError> {
        let settings = Settings::load(&path)?;
        let last_change = settings.last_cache_invalidation;
        Ok(Self {
            path,
            inner: RwLock::new(StoreInner {
                settings,
                loaded_at: Instant::now(),
                revision: 0,
                last_change,
            }),
        })
    }

    pub fn open_default() -> Result<Self, ConfigError> {
        Self::open(Settings::default_path()?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current settings, reloading from disk when the snapshot went stale.
    pub async fn current(&self) -> Result<Settings, ConfigError> {
        {
            let inner = self.inner.read().await;
            if inner.loaded_at.elapsed() < SETTINGS_TTL {
                return Ok(inner.settings.clone());
            }
        }

        let fresh = Settings::load(&self.path)?;
        let mut inner = self.inner.write().await;
        if fresh.affects_ocr(&inner.settings) {
            inner.revision += 1;
            inner.last_change = Some(Utc::now());
        }
        inner.settings = fresh.clone();
        inner.loaded_at = Instant::now();
        Ok(fresh)
    }

    /// Replace settings, persist them, and bump the revision when the change
    /// affects OCR results.
    pub async fn update(&self, mut settings: Settings) -> Result<(), ConfigError> {
        let mut inner = self.inner.write().await;
        if settings.affects_ocr(&inner.settings) {
            inner.revision += 1;
            let now = Utc::now();
            inner.last_change = Some(now);
            settings.last_cache_invalidation = Some(now);
            info!("settings changed, revision {}", inner.revision);
        }
        settings.save(&self.path)?;
        inner.settings = settings;
        inner.loaded_at = Instant::now();
        Ok(())
    }

    /// Record a completed local model initialization.
    ///
    /// Edits the on-disk file directly so environment-derived overrides in the
    /// in-memory snapshot never get written back.
    pub async fn mark_local_model_initialized(&self) -> Result<(), ConfigError> {
        let mut inner = self.inner.write().await;
        let mut on_disk = Settings::load_raw(&self.path)?;
        if !on_disk.local_model_initialized {
            on_disk.local_model_initialized = true;
            on_disk.save(&self.path)?;
        }
        inner.settings.local_model_initialized = true;
        Ok(())
    }

    /// Monotonic counter of OCR-affecting changes.
    pub async fn revision(&self) -> u64 {
        self.inner.read().await.revision
    }

    pub async fn last_change(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.last_change
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let settings = Settings::default();
        let raw = toml::to_string_pretty(&settings).unwrap();
        let back: Settings = toml::from_str(&raw).unwrap();
        assert_eq!(back.model, "gemini-2.0-flash");
        assert_eq!(back.language, Language::Ja);
        assert!(!back.local.enabled);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let settings: Settings = toml::from_str("mode = \"fast\"").unwrap();
        assert_eq!(settings.mode, OcrMode::Fast);
        assert_eq!(settings.language, Language::Ja);
        assert_eq!(settings.remote.timeout_secs, 15);
    }

    #[test]
    fn ocr_affecting_changes_are_detected() {
        let base = Settings::default();

        let mut changed = base.clone();
        changed.mode = OcrMode::Fast;
        assert!(base.affects_ocr(&changed));

        let mut key_only = base.clone();
        key_only.api_key = "secret".to_string();
        assert!(base.affects_ocr(&key_only));

        let mut state_only = base.clone();
        state_only.local_model_initialized = true;
        state_only.remote.timeout_secs = 60;
        assert!(!base.affects_ocr(&state_only));
    }

    #[tokio::test]
    async fn update_bumps_revision_for_ocr_changes_only() {
        let dir = std::env::temp_dir().join(format!("fieldsnap-test-{}", std::process::id()));
        let path = dir.join("config.toml");
        let store = SettingsStore::open(path).unwrap();
        assert_eq!(store.revision().await, 0);

        let mut settings = store.current().await.unwrap();
        settings.local.init_timeout_secs = 600;
        store.update(settings.clone()).await.unwrap();
        assert_eq!(store.revision().await, 0);

        settings.api_key = "secret".to_string();
        store.update(settings.clone()).await.unwrap();
        assert_eq!(store.revision().await, 1);

        settings.model = "gemini-2.0-flash-lite".to_string();
        store.update(settings).await.unwrap();
        assert_eq!(store.revision().await, 2);
        assert!(store.last_change().await.is_some());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn init_flag_never_persists_an_env_derived_key() {
        let dir = std::env::temp_dir().join(format!("fieldsnap-init-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "api_key = \"disk-key\"\n").unwrap();

        std::env::set_var("FIELDSNAP_API_KEY", "env-only-key");
        let store = SettingsStore::open(path.clone()).unwrap();
        assert_eq!(store.current().await.unwrap().api_key, "env-only-key");

        store.mark_local_model_initialized().await.unwrap();
        std::env::remove_var("FIELDSNAP_API_KEY");

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("disk-key"));
        assert!(!raw.contains("env-only-key"));

        assert!(store.current().await.unwrap().local_model_initialized);
        let reloaded = Settings::load(&path).unwrap();
        assert!(reloaded.local_model_initialized);

        let _ = std::fs::remove_dir_all(dir);
    }
}

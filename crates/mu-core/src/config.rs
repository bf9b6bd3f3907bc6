//! Client configuration
//!
//! Loaded from TOML. Lookup order:
//! - `MELODY_UNMIX_CONFIG` (explicit path)
//! - `<config dir>/melody-unmix/config.toml`
//! - built-in defaults
//!
//! `MELODY_UNMIX_API_BASE` overrides the backend URL in every case.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{UnmixError, UnmixResult};

/// Env var naming an explicit config file
pub const CONFIG_ENV: &str = "MELODY_UNMIX_CONFIG";
/// Env var overriding `api_base`
pub const API_BASE_ENV: &str = "MELODY_UNMIX_API_BASE";

const APP_DIR: &str = "melody-unmix";

/// Top-level client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend origin, without a trailing `/api`
    pub api_base: String,
    /// Per-request timeout (milliseconds)
    pub request_timeout_ms: u64,
    /// Overrides where the persistent store lives
    pub storage_dir: Option<PathBuf>,
    /// Status polling cadence
    pub polling: PollingConfig,
    /// Upload admission rules
    pub upload: UploadConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:8000".to_string(),
            request_timeout_ms: 30_000,
            storage_dir: None,
            polling: PollingConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}

/// Polling delays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay after a healthy non-terminal answer
    pub base_delay_ms: u64,
    /// Added per transient failure
    pub step_ms: u64,
    /// Backoff ceiling
    pub max_delay_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 3_000,
            step_ms: 3_000,
            max_delay_ms: 15_000,
        }
    }
}

/// Upload limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_size_mb: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self { max_size_mb: 50 }
    }
}

impl UploadConfig {
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb * 1024 * 1024
    }
}

impl ClientConfig {
    /// Resolve the config from env and the user config dir.
    pub fn load() -> UnmixResult<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::load_from_path(Path::new(&path))?,
            Err(_) => match default_config_path() {
                Some(path) if path.exists() => Self::load_from_path(&path)?,
                _ => Self::default(),
            },
        };

        if let Ok(base) = std::env::var(API_BASE_ENV) {
            log::debug!("[Config] api_base overridden from {}", API_BASE_ENV);
            config.api_base = base;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> UnmixResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| UnmixError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml(&raw)
            .map_err(|e| UnmixError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(raw: &str) -> UnmixResult<Self> {
        toml::from_str(raw).map_err(|e| UnmixError::Config(e.to_string()))
    }

    pub fn validate(&self) -> UnmixResult<()> {
        let url = url::Url::parse(&self.api_base)
            .map_err(|e| UnmixError::Config(format!("invalid api_base '{}': {}", self.api_base, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(UnmixError::Config(format!(
                "api_base must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.polling.step_ms == 0 {
            return Err(UnmixError::Config("polling.step_ms must be positive".into()));
        }
        if self.polling.base_delay_ms == 0 || self.polling.base_delay_ms > self.polling.max_delay_ms {
            return Err(UnmixError::Config(
                "polling.base_delay_ms must be positive and not above polling.max_delay_ms".into(),
            ));
        }
        if self.upload.max_size_mb == 0 {
            return Err(UnmixError::Config("upload.max_size_mb must be positive".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Where the persistent store lives
    pub fn persistent_dir(&self) -> PathBuf {
        self.storage_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
        })
    }

    /// Where the session-scoped store lives (cleared with the login session)
    pub fn session_dir(&self) -> PathBuf {
        dirs::runtime_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR)
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

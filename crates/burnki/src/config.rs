//! Typed Burnki settings
//!
//! The settings file (`~/.config/burnki/burnki.json`) is a loose JSON
//! object. It is deserialized with defaults, validated once, and the
//! resulting [`Settings`] is passed explicitly to the sync engine.
//!
//! The API token is resolved in order of priority:
//! 1. `api_token` (or the older `wanikani_api_token`) in the settings file
//! 2. The `WANIKANI_API_TOKEN` environment variable

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::Watermark;
use crate::wanikani::DEFAULT_BASE_URL;

/// Settings filename in the Burnki config directory
pub const CONFIG_FILE: &str = "burnki.json";

/// Environment variable consulted when no token is configured
pub const TOKEN_ENV_VAR: &str = "WANIKANI_API_TOKEN";

/// Validated Burnki settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_token: String,
    pub auto_sync_on_startup: bool,
    pub download_audio: bool,
    /// Watermark as stored when the file was read
    ///
    /// Read-only: syncs load and save the watermark through a
    /// `WatermarkStore`, so this goes stale after the next sync.
    pub last_sync_timestamp: Watermark,
    pub api_base_url: String,
    /// Timeout applied to every HTTP request
    pub request_timeout: Duration,
    /// Attempts per request for transient failures
    pub max_attempts: u32,
    /// Size of the network worker pool
    pub concurrency: usize,
    /// Longest pause we accept when WaniKani throttles us
    pub max_rate_limit_wait: Duration,
}

/// Settings file format
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawSettings {
    #[serde(alias = "wanikani_api_token")]
    api_token: String,
    auto_sync_on_startup: bool,
    download_audio: bool,
    last_sync_timestamp: String,
    api_base_url: String,
    request_timeout_secs: u64,
    max_attempts: u32,
    concurrency: usize,
    max_rate_limit_wait_secs: u64,
}

impl Default for RawSettings {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            auto_sync_on_startup: true,
            download_audio: true,
            last_sync_timestamp: String::new(),
            api_base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 30,
            max_attempts: 3,
            concurrency: 4,
            max_rate_limit_wait_secs: 60,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            auto_sync_on_startup: true,
            download_audio: true,
            last_sync_timestamp: Watermark::empty(),
            api_base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            max_attempts: 3,
            concurrency: 4,
            max_rate_limit_wait: Duration::from_secs(60),
        }
    }
}

impl Settings {
    /// Load settings from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw: RawSettings = config::load_json_file(path)?;
        Ok(Self::from_raw(raw)?.with_env_token())
    }

    /// Parse settings from a JSON string
    ///
    /// Does not consult the environment.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawSettings =
            serde_json::from_str(json).context("Failed to parse settings JSON")?;
        Self::from_raw(raw)
    }

    /// Validate raw settings
    fn from_raw(raw: RawSettings) -> Result<Self> {
        let last_sync_timestamp = Watermark::parse(&raw.last_sync_timestamp).with_context(|| {
            format!(
                "Invalid last_sync_timestamp '{}': expected an ISO 8601 timestamp or empty",
                raw.last_sync_timestamp
            )
        })?;

        let api_base_url = raw.api_base_url.trim().trim_end_matches('/').to_string();
        url::Url::parse(&api_base_url)
            .with_context(|| format!("Invalid api_base_url '{}'", raw.api_base_url))?;

        if raw.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be at least 1");
        }

        Ok(Self {
            api_token: raw.api_token.trim().to_string(),
            auto_sync_on_startup: raw.auto_sync_on_startup,
            download_audio: raw.download_audio,
            last_sync_timestamp,
            api_base_url,
            request_timeout: Duration::from_secs(raw.request_timeout_secs),
            max_attempts: raw.max_attempts.max(1),
            concurrency: raw.concurrency.max(1),
            max_rate_limit_wait: Duration::from_secs(raw.max_rate_limit_wait_secs),
        })
    }

    /// Fall back to the environment when no token is configured
    pub fn with_env_token(mut self) -> Self {
        if !self.has_token()
            && let Ok(token) = std::env::var(TOKEN_ENV_VAR)
        {
            self.api_token = token.trim().to_string();
        }
        self
    }

    /// Get the default settings file path (~/.config/burnki/burnki.json)
    pub fn default_config_path() -> Option<PathBuf> {
        config::config_path(CONFIG_FILE)
    }

    pub fn has_token(&self) -> bool {
        !self.api_token.is_empty()
    }
}

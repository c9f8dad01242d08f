//! Configuration Management
//!
//! Reads the persistent configuration for xbe: default base URL, request
//! timeout and the per-base-URL token store written by `xbe auth login`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Production API
pub const DEFAULT_BASE_URL: &str = "https://app.x-b-e.com";

/// Environment override for the base URL
pub const BASE_URL_ENV: &str = "XBE_BASE_URL";

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// User configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Base URL used when neither `--base-url` nor `XBE_BASE_URL` is set
    #[serde(default)]
    pub base_url: Option<String>,
    /// HTTP timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Stored tokens keyed by base URL
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
}

impl Config {
    /// Directory holding config, log and token files
    ///
    /// Honors `XDG_CONFIG_HOME` before the platform default.
    pub fn config_dir() -> Option<PathBuf> {
        std::env::var_os("XDG_CONFIG_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(dirs::config_dir)
            .map(|p| p.join("xbe"))
    }

    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load configuration from a specific file; missing or malformed files yield defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("Failed to read config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Get effective base URL (XBE_BASE_URL > config > default)
    pub fn effective_base_url(&self) -> String {
        self.base_url_with_env(std::env::var(BASE_URL_ENV).ok())
    }

    fn base_url_with_env(&self, env: Option<String>) -> String {
        env.filter(|v| !v.trim().is_empty())
            .or_else(|| self.base_url.clone().filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(
            self.timeout_secs
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        )
    }
}

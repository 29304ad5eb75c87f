//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (OFFCAST_*)
//! 2. TOML config file (if OFFCAST_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (OFFCAST_*)
/// 2. TOML config file (if OFFCAST_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the gateway listens on.
    ///
    /// Set via OFFCAST_LISTEN_ADDR environment variable.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Origin of the upstream application being fronted.
    ///
    /// Set via OFFCAST_UPSTREAM environment variable.
    #[serde(default = "default_upstream")]
    pub upstream: String,

    /// Path to the SQLite cache database.
    ///
    /// Set via OFFCAST_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Logical cache name, combined with `cache_version` into the
    /// current cache version identifier.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Semantic version of the cache. Bumping it triggers a rollover:
    /// entries under every other version are deleted on activation.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Critical resources pre-cached during install. Install fails
    /// atomically if any of these cannot be fetched.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Well-known path of the pre-built offline document, consulted
    /// before synthesizing a fallback page for failed navigations.
    #[serde(default = "default_offline_doc")]
    pub offline_doc: String,

    /// Path prefixes classified as API requests.
    #[serde(default = "default_api_prefixes")]
    pub api_prefixes: Vec<String>,

    /// Patterns selecting which GET API paths are eligible for brief
    /// caching (listings only, never personalized endpoints).
    #[serde(default = "default_cacheable_api_patterns")]
    pub cacheable_api_patterns: Vec<String>,

    /// File extensions classified as static assets.
    #[serde(default = "default_static_extensions")]
    pub static_extensions: Vec<String>,

    /// Foreign origins whose requests are still intercepted. Anything
    /// else cross-origin bypasses the caching layer entirely.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Nominal freshness window for cached API entries, in seconds.
    #[serde(default = "default_api_entry_ttl_secs")]
    pub api_entry_ttl_secs: u64,

    /// Upstream fetch timeout in milliseconds.
    ///
    /// Set via OFFCAST_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum number of redirects to follow upstream.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Maximum bytes to accept per upstream response.
    ///
    /// Set via OFFCAST_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// User-Agent string for upstream requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Base backoff for background-sync replays, in seconds. Doubles
    /// on every failed attempt.
    #[serde(default = "default_sync_base_backoff_secs")]
    pub sync_base_backoff_secs: u64,

    /// Maximum replay attempts before a pending action is dropped.
    #[serde(default = "default_sync_max_attempts")]
    pub sync_max_attempts: u32,

    /// Default title for notifications built from push payloads that
    /// carry none.
    #[serde(default = "default_notification_title")]
    pub notification_title: String,

    /// Default body for notifications built from empty push payloads.
    #[serde(default = "default_notification_body")]
    pub notification_body: String,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8787".into()
}

fn default_upstream() -> String {
    "http://127.0.0.1:8080".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./offcast-cache.sqlite")
}

fn default_cache_name() -> String {
    "offcast".into()
}

fn default_cache_version() -> String {
    "v1.0.0".into()
}

fn default_precache() -> Vec<String> {
    vec![
        "/".into(),
        "/index.html".into(),
        "/manifest.json".into(),
        "/offline.html".into(),
    ]
}

fn default_offline_doc() -> String {
    "/offline.html".into()
}

fn default_api_prefixes() -> Vec<String> {
    vec!["/api/".into(), "/backend/api/".into()]
}

fn default_cacheable_api_patterns() -> Vec<String> {
    vec![
        "^/api/v1/videos".into(),
        "^/api/v1/categories".into(),
        "^/api/v1/livestreams".into(),
    ]
}

fn default_static_extensions() -> Vec<String> {
    ["js", "css", "png", "jpg", "jpeg", "gif", "svg", "ico", "woff", "woff2", "ttf"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_allowed_origins() -> Vec<String> {
    vec!["https://fonts.googleapis.com".into(), "https://fonts.gstatic.com".into()]
}

fn default_api_entry_ttl_secs() -> u64 {
    300
}

fn default_timeout_ms() -> u64 {
    8_000
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_user_agent() -> String {
    "offcast/0.1".into()
}

fn default_sync_base_backoff_secs() -> u64 {
    30
}

fn default_sync_max_attempts() -> u32 {
    5
}

fn default_notification_title() -> String {
    "offcast".into()
}

fn default_notification_body() -> String {
    "New content available!".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            upstream: default_upstream(),
            db_path: default_db_path(),
            cache_name: default_cache_name(),
            cache_version: default_cache_version(),
            precache: default_precache(),
            offline_doc: default_offline_doc(),
            api_prefixes: default_api_prefixes(),
            cacheable_api_patterns: default_cacheable_api_patterns(),
            static_extensions: default_static_extensions(),
            allowed_origins: default_allowed_origins(),
            api_entry_ttl_secs: default_api_entry_ttl_secs(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
            max_bytes: default_max_bytes(),
            user_agent: default_user_agent(),
            sync_base_backoff_secs: default_sync_base_backoff_secs(),
            sync_max_attempts: default_sync_max_attempts(),
            notification_title: default_notification_title(),
            notification_body: default_notification_body(),
        }
    }
}

impl AppConfig {
    /// Upstream fetch timeout as a Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Nominal API entry freshness window as a Duration.
    pub fn api_entry_ttl(&self) -> Duration {
        Duration::from_secs(self.api_entry_ttl_secs)
    }

    /// The current cache version identifier, e.g. `offcast-v1.0.0`.
    ///
    /// Exactly one version is current at a time; entries under any other
    /// identifier are stale and deleted on activation.
    pub fn current_cache(&self) -> String {
        format!("{}-{}", self.cache_name, self.cache_version)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `OFFCAST_`
    /// 2. TOML file from `OFFCAST_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("OFFCAST_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("OFFCAST_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

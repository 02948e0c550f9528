//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SHELTER_*)
//! 2. TOML config file (if SHELTER_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::PartitionNames;
use crate::classify::StrategyKind;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SHELTER_*, nested keys separated by `__`)
/// 2. TOML config file (if SHELTER_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Human-readable product name, used as the default notification title.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Release tag. Partitions carrying any other tag are pruned.
    ///
    /// Set via SHELTER_VERSION environment variable.
    #[serde(default = "default_version")]
    pub version: String,

    /// Product prefix shared by all partition names.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Origin the worker is scoped to. Manifest paths resolve against it.
    ///
    /// Set via SHELTER_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Path to SQLite partition database.
    ///
    /// Set via SHELTER_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Total stored body bytes before writes start failing.
    #[serde(default)]
    pub cache_quota_bytes: Option<u64>,

    /// User-Agent string for network requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum response body accepted from the network.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// TCP connect timeout. Requests themselves are never timed out here.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Critical assets pre-cached on install (paths on `origin`).
    #[serde(default = "default_static_assets")]
    pub static_assets: Vec<String>,

    /// Hosts of remote data providers treated as API calls.
    #[serde(default = "default_api_hosts")]
    pub api_hosts: Vec<String>,

    /// Same-origin path prefix reserved for API routes.
    #[serde(default = "default_api_path_prefix")]
    pub api_path_prefix: String,

    /// URL regex to strategy table for assets and runtime requests.
    #[serde(default = "default_runtime_patterns")]
    pub runtime_patterns: Vec<RuntimePattern>,

    /// Max-age per partition class.
    #[serde(default)]
    pub max_age: MaxAgeConfig,

    /// Tag of the deferred-sync signal that replays the outbox.
    #[serde(default = "default_sync_tag")]
    pub sync_tag: String,

    /// Tag of the periodic signal that refreshes the static manifest.
    #[serde(default = "default_periodic_sync_tag")]
    pub periodic_sync_tag: String,

    /// Icon shown with push notifications.
    #[serde(default = "default_notification_icon")]
    pub notification_icon: String,

    /// Failed mutating requests kept for replay.
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
}

/// One row of the runtime pattern table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimePattern {
    /// Regex matched against the URL up to and including its path.
    pub pattern: String,
    pub strategy: StrategyKind,
}

/// Max-age in seconds per partition class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxAgeConfig {
    #[serde(default = "default_static_secs")]
    pub static_secs: u64,
    #[serde(default = "default_dynamic_secs")]
    pub dynamic_secs: u64,
    #[serde(default = "default_api_secs")]
    pub api_secs: u64,
    #[serde(default = "default_image_secs")]
    pub image_secs: u64,
}

impl MaxAgeConfig {
    pub fn static_ttl(&self) -> Duration {
        Duration::from_secs(self.static_secs)
    }

    pub fn dynamic_ttl(&self) -> Duration {
        Duration::from_secs(self.dynamic_secs)
    }

    pub fn api_ttl(&self) -> Duration {
        Duration::from_secs(self.api_secs)
    }

    pub fn image_ttl(&self) -> Duration {
        Duration::from_secs(self.image_secs)
    }
}

impl Default for MaxAgeConfig {
    fn default() -> Self {
        Self {
            static_secs: default_static_secs(),
            dynamic_secs: default_dynamic_secs(),
            api_secs: default_api_secs(),
            image_secs: default_image_secs(),
        }
    }
}

fn default_app_name() -> String {
    "Shelter".into()
}

fn default_version() -> String {
    "v1".into()
}

fn default_cache_prefix() -> String {
    "shelter".into()
}

fn default_origin() -> String {
    "http://localhost:3000".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./shelter-cache.sqlite")
}

fn default_user_agent() -> String {
    "shelter/0.1".into()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_static_assets() -> Vec<String> {
    ["/", "/manifest.json", "/icons/icon-192x192.png", "/icons/icon-512x512.png"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_api_hosts() -> Vec<String> {
    vec!["api.aviationstack.com".into()]
}

fn default_api_path_prefix() -> String {
    "/api/".into()
}

fn default_runtime_patterns() -> Vec<RuntimePattern> {
    [
        (r"(?i)\.(?:png|jpe?g|gif|svg|webp|avif|ico)$", StrategyKind::CacheFirst),
        (r"(?i)\.(?:js|mjs|css)$", StrategyKind::StaleWhileRevalidate),
        (r"(?i)\.(?:woff2?|ttf|otf|eot)$", StrategyKind::StaleWhileRevalidate),
        (r"^https://fonts\.(?:googleapis|gstatic)\.com/", StrategyKind::StaleWhileRevalidate),
    ]
    .into_iter()
    .map(|(pattern, strategy)| RuntimePattern { pattern: pattern.into(), strategy })
    .collect()
}

fn default_static_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_dynamic_secs() -> u64 {
    24 * 60 * 60
}

fn default_api_secs() -> u64 {
    5 * 60
}

fn default_image_secs() -> u64 {
    30 * 24 * 60 * 60
}

fn default_sync_tag() -> String {
    "background-sync".into()
}

fn default_periodic_sync_tag() -> String {
    "content-sync".into()
}

fn default_notification_icon() -> String {
    "/icons/icon-192x192.png".into()
}

fn default_outbox_capacity() -> usize {
    50
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            version: default_version(),
            cache_prefix: default_cache_prefix(),
            origin: default_origin(),
            db_path: default_db_path(),
            cache_quota_bytes: None,
            user_agent: default_user_agent(),
            max_body_bytes: default_max_body_bytes(),
            connect_timeout_ms: default_connect_timeout_ms(),
            static_assets: default_static_assets(),
            api_hosts: default_api_hosts(),
            api_path_prefix: default_api_path_prefix(),
            runtime_patterns: default_runtime_patterns(),
            max_age: MaxAgeConfig::default(),
            sync_tag: default_sync_tag(),
            periodic_sync_tag: default_periodic_sync_tag(),
            notification_icon: default_notification_icon(),
            outbox_capacity: default_outbox_capacity(),
        }
    }
}

impl AppConfig {
    /// Connect timeout as Duration for use with reqwest.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Parsed worker origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` is not an absolute http(s) URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(ConfigError::Invalid { field: "origin".into(), reason: format!("unsupported scheme {scheme}") }),
        }
    }

    /// Partition naming for the configured prefix and release.
    pub fn partition_names(&self) -> PartitionNames {
        PartitionNames::new(&self.cache_prefix, &self.version)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SHELTER_`
    /// 2. TOML file from `SHELTER_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("SHELTER_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SHELTER_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

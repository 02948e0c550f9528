//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::classify::Classifier;
use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `version` or `cache_prefix` is empty,
    /// and `ConfigError::Invalid` if:
    /// - `origin` is not an absolute http(s) URL
    /// - a static asset path does not start with `/`
    /// - a runtime pattern does not compile
    /// - any max-age, `max_body_bytes` or `outbox_capacity` is 0
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "version".into(),
                hint: "Set SHELTER_VERSION to the release tag".into(),
            });
        }

        if self.cache_prefix.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "cache_prefix".into(),
                hint: "Set SHELTER_CACHE_PREFIX to the product prefix".into(),
            });
        }

        if let Some(path) = self.static_assets.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::Invalid {
                field: "static_assets".into(),
                reason: format!("{path} must be an absolute path starting with /"),
            });
        }

        // Compiling also checks the origin.
        Classifier::from_config(self)?;

        let max_ages = [
            ("max_age.static_secs", self.max_age.static_secs),
            ("max_age.dynamic_secs", self.max_age.dynamic_secs),
            ("max_age.api_secs", self.max_age.api_secs),
            ("max_age.image_secs", self.max_age.image_secs),
        ];
        if let Some((field, _)) = max_ages.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::Invalid { field: (*field).into(), reason: "must be greater than 0".into() });
        }

        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_body_bytes".into(), reason: "must be greater than 0".into() });
        }

        if self.outbox_capacity == 0 {
            return Err(ConfigError::Invalid { field: "outbox_capacity".into(), reason: "must be greater than 0".into() });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if !self.static_assets.iter().any(|p| p == "/") {
            tracing::warn!(
                static_assets = self.static_assets.len(),
                "static_assets does not include /; offline navigations cannot fall back to the app shell"
            );
        }

        Ok(())
    }
}

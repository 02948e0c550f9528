//! Request classification and strategy routing.
//!
//! Classes are evaluated in fixed precedence: static asset, API, navigation,
//! then runtime as the default. Only GET requests over http(s) are
//! classified; everything else passes through untouched.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use http::Method;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::{Position, Url};

use crate::cache::PartitionRole;
use crate::config::{AppConfig, ConfigError, MaxAgeConfig};
use crate::message::{Request, same_origin};

/// Scripts, styles, fonts and images by file extension.
const ASSET_PATTERN: &str = r"(?i)\.(?:js|mjs|css|woff2?|ttf|otf|eot|png|jpe?g|gif|svg|webp|avif|ico)$";

const IMAGE_PATTERN: &str = r"(?i)\.(?:png|jpe?g|gif|svg|webp|avif|ico)$";

/// Caching algorithm applied to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

impl StrategyKind {
    /// Partition each strategy reads and writes.
    pub fn role(&self) -> PartitionRole {
        match self {
            Self::CacheFirst => PartitionRole::Static,
            Self::NetworkFirst => PartitionRole::Dynamic,
            Self::StaleWhileRevalidate => PartitionRole::Runtime,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CacheFirst => "cache-first",
            Self::NetworkFirst => "network-first",
            Self::StaleWhileRevalidate => "stale-while-revalidate",
        })
    }
}

/// Derived, non-persisted label of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RequestClass {
    StaticAsset,
    Api,
    Navigation,
    Runtime,
}

/// Everything the executor needs to serve one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub class: RequestClass,
    pub strategy: StrategyKind,
    pub role: PartitionRole,
    pub max_age: Duration,
}

impl Route {
    pub fn new(class: RequestClass, strategy: StrategyKind, max_age: Duration) -> Self {
        Self { class, strategy, role: strategy.role(), max_age }
    }
}

/// Classifier compiled from configuration.
#[derive(Debug, Clone)]
pub struct Classifier {
    origin: Url,
    static_paths: HashSet<String>,
    asset_pattern: Regex,
    image_pattern: Regex,
    api_hosts: Vec<String>,
    api_path_prefix: String,
    runtime_patterns: Vec<(Regex, StrategyKind)>,
    max_age: MaxAgeConfig,
}

impl Classifier {
    /// Compile the classifier.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin does not parse or a
    /// runtime pattern is not a valid regex.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let origin = config.origin_url()?;

        let mut runtime_patterns = Vec::with_capacity(config.runtime_patterns.len());
        for rule in &config.runtime_patterns {
            let regex = Regex::new(&rule.pattern).map_err(|e| ConfigError::Invalid {
                field: "runtime_patterns".into(),
                reason: format!("{}: {e}", rule.pattern),
            })?;
            runtime_patterns.push((regex, rule.strategy));
        }

        Ok(Self {
            origin,
            static_paths: config.static_assets.iter().cloned().collect(),
            asset_pattern: compile_builtin(ASSET_PATTERN)?,
            image_pattern: compile_builtin(IMAGE_PATTERN)?,
            api_hosts: config.api_hosts.iter().map(|h| h.to_ascii_lowercase()).collect(),
            api_path_prefix: config.api_path_prefix.clone(),
            runtime_patterns,
            max_age: config.max_age.clone(),
        })
    }

    /// Label a request, or `None` when it must not be intercepted.
    pub fn classify(&self, request: &Request) -> Option<RequestClass> {
        if request.method != Method::GET || !request.is_http() {
            return None;
        }

        let path = request.url.path();
        let same_origin = same_origin(&request.url, &self.origin);

        if self.is_manifest_asset(request) || self.asset_pattern.is_match(path) {
            return Some(RequestClass::StaticAsset);
        }

        let api_host = request
            .url
            .host_str()
            .is_some_and(|host| self.api_hosts.iter().any(|h| h == host));
        if api_host || (same_origin && path.starts_with(&self.api_path_prefix)) {
            return Some(RequestClass::Api);
        }

        if request.is_navigation() || request.accepts_html() {
            return Some(RequestClass::Navigation);
        }

        Some(RequestClass::Runtime)
    }

    /// Pick strategy, partition and max-age for a request.
    pub fn route(&self, request: &Request) -> Option<Route> {
        let class = self.classify(request)?;
        let is_image = self.image_pattern.is_match(request.url.path());

        let route = match class {
            RequestClass::StaticAsset => {
                let strategy = if self.is_manifest_asset(request) {
                    StrategyKind::CacheFirst
                } else {
                    self.pattern_strategy(&request.url).unwrap_or(StrategyKind::CacheFirst)
                };
                let max_age = if is_image { self.max_age.image_ttl() } else { self.max_age.static_ttl() };
                Route::new(class, strategy, max_age)
            }
            RequestClass::Api => Route::new(class, StrategyKind::NetworkFirst, self.max_age.api_ttl()),
            RequestClass::Navigation => Route::new(class, StrategyKind::NetworkFirst, self.max_age.dynamic_ttl()),
            RequestClass::Runtime => {
                let strategy = self
                    .pattern_strategy(&request.url)
                    .unwrap_or(StrategyKind::StaleWhileRevalidate);
                Route::new(class, strategy, self.max_age.dynamic_ttl())
            }
        };

        Some(route)
    }

    /// First runtime pattern matching the URL without its query.
    fn pattern_strategy(&self, url: &Url) -> Option<StrategyKind> {
        let target = &url[..Position::AfterPath];
        self.runtime_patterns
            .iter()
            .find(|(regex, _)| regex.is_match(target))
            .map(|(_, strategy)| *strategy)
    }

    fn is_manifest_asset(&self, request: &Request) -> bool {
        same_origin(&request.url, &self.origin) && self.static_paths.contains(request.url.path())
    }
}

fn compile_builtin(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::Invalid { field: "builtin pattern".into(), reason: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimePattern;

    fn classifier() -> Classifier {
        let config = AppConfig { origin: "https://app.example.com".into(), ..Default::default() };
        Classifier::from_config(&config).unwrap()
    }

    fn get(url: &str) -> Request {
        Request::get(url).unwrap()
    }

    #[test]
    fn test_manifest_path_is_static() {
        let c = classifier();
        let route = c.route(&get("https://app.example.com/manifest.json")).unwrap();
        assert_eq!(route.class, RequestClass::StaticAsset);
        assert_eq!(route.strategy, StrategyKind::CacheFirst);
        assert_eq!(route.role, PartitionRole::Static);
    }

    #[test]
    fn test_icon_is_cache_first_with_image_max_age() {
        let c = classifier();
        let route = c.route(&get("https://app.example.com/icons/icon-192x192.png")).unwrap();
        assert_eq!(route.class, RequestClass::StaticAsset);
        assert_eq!(route.strategy, StrategyKind::CacheFirst);
        assert_eq!(route.max_age, AppConfig::default().max_age.image_ttl());
    }

    #[test]
    fn test_scripts_are_stale_while_revalidate() {
        let c = classifier();
        let route = c.route(&get("https://app.example.com/_next/static/chunks/main.js?v=3")).unwrap();
        assert_eq!(route.class, RequestClass::StaticAsset);
        assert_eq!(route.strategy, StrategyKind::StaleWhileRevalidate);
        assert_eq!(route.role, PartitionRole::Runtime);
    }

    #[test]
    fn test_api_host() {
        let c = classifier();
        let route = c.route(&get("https://api.aviationstack.com/v1/flights?flight_iata=BA117")).unwrap();
        assert_eq!(route.class, RequestClass::Api);
        assert_eq!(route.strategy, StrategyKind::NetworkFirst);
        assert_eq!(route.max_age, AppConfig::default().max_age.api_ttl());
    }

    #[test]
    fn test_api_path_prefix_same_origin_only() {
        let c = classifier();
        assert_eq!(c.classify(&get("https://app.example.com/api/chats")), Some(RequestClass::Api));
        assert_eq!(c.classify(&get("https://elsewhere.example.org/api/chats")), Some(RequestClass::Runtime));
    }

    #[test]
    fn test_navigation_by_mode_and_accept() {
        let c = classifier();
        assert_eq!(c.classify(&get("https://app.example.com/chat/42").navigate()), Some(RequestClass::Navigation));

        let html = get("https://app.example.com/settings").with_accept("text/html").unwrap();
        assert_eq!(c.classify(&html), Some(RequestClass::Navigation));
    }

    #[test]
    fn test_static_beats_navigation() {
        let c = classifier();
        let root = get("https://app.example.com/").navigate();
        assert_eq!(c.classify(&root), Some(RequestClass::StaticAsset));
    }

    #[test]
    fn test_runtime_default() {
        let c = classifier();
        let route = c.route(&get("https://app.example.com/data/feed")).unwrap();
        assert_eq!(route.class, RequestClass::Runtime);
        assert_eq!(route.strategy, StrategyKind::StaleWhileRevalidate);
    }

    #[test]
    fn test_google_fonts_stylesheet() {
        let c = classifier();
        let route = c.route(&get("https://fonts.googleapis.com/css2?family=Inter")).unwrap();
        assert_eq!(route.class, RequestClass::Runtime);
        assert_eq!(route.strategy, StrategyKind::StaleWhileRevalidate);
    }

    #[test]
    fn test_custom_runtime_pattern() {
        let config = AppConfig {
            runtime_patterns: vec![RuntimePattern {
                pattern: r"^https://cdn\.example\.com/".into(),
                strategy: StrategyKind::NetworkFirst,
            }],
            ..Default::default()
        };
        let c = Classifier::from_config(&config).unwrap();
        let route = c.route(&get("https://cdn.example.com/feed")).unwrap();
        assert_eq!(route.strategy, StrategyKind::NetworkFirst);
        assert_eq!(route.role, PartitionRole::Dynamic);
    }

    #[test]
    fn test_non_get_and_non_http_pass_through() {
        let c = classifier();
        let post = Request::new(Method::POST, Url::parse("https://app.example.com/api/chats").unwrap());
        assert_eq!(c.classify(&post), None);

        let ext = Request::new(Method::GET, Url::parse("chrome-extension://abc/script.js").unwrap());
        assert_eq!(c.route(&ext), None);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let config = AppConfig {
            runtime_patterns: vec![RuntimePattern { pattern: "(".into(), strategy: StrategyKind::CacheFirst }],
            ..Default::default()
        };
        assert!(matches!(Classifier::from_config(&config), Err(ConfigError::Invalid { .. })));
    }
}

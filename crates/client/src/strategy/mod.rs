//! Strategy executor: cache-first, network-first and stale-while-revalidate.
//!
//! ### Failure policy
//! - A non-2xx response counts as a failure for fallback purposes and is
//!   never stored
//! - Cache lookup errors are logged and treated as a miss
//! - Cache write errors are logged and swallowed; the network response still
//!   reaches the caller
//! - Network-first never returns an error
//! - Cache-first and stale-while-revalidate propagate the network error only
//!   when nothing is cached

pub mod fallback;
pub mod revalidate;

use std::sync::Arc;

use serde::Serialize;
use url::Url;

use shelter_core::expiry::{self, Freshness};
use shelter_core::{
    AppConfig, CacheRegistry, Classifier, Error, PartitionNames, PartitionRole, Request, RequestClass, RequestKey,
    Response, Route, StoredEntry, StrategyKind,
};

use crate::fetch::Network;

pub use fallback::{OFFLINE_HEADER, is_synthetic, offline_html, offline_json};
pub use revalidate::Revalidation;

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseSource {
    Network,
    /// Cached entry within its max-age.
    Cache,
    /// Cached entry past its max-age, served because the network failed
    /// or a refresh is in flight.
    StaleCache,
    /// Synthetic offline response.
    Fallback,
    /// Not intercepted; sent straight to the network.
    Passthrough,
}

/// Outcome of serving one request.
#[derive(Debug)]
pub struct Handled {
    pub response: Response,
    pub source: ResponseSource,
    /// `None` for passthrough.
    pub route: Option<Route>,
    /// Background refresh started by a stale-while-revalidate hit.
    pub revalidation: Option<Revalidation>,
}

impl Handled {
    fn new(response: Response, source: ResponseSource, route: Route) -> Self {
        Self { response, source, route: Some(route), revalidation: None }
    }

    pub(crate) fn passthrough(response: Response) -> Self {
        Self { response, source: ResponseSource::Passthrough, route: None, revalidation: None }
    }
}

/// Partition reads and writes with the failure policy applied.
#[derive(Clone)]
struct Store {
    registry: CacheRegistry,
    names: PartitionNames,
}

impl Store {
    async fn lookup(&self, role: PartitionRole, key: &RequestKey) -> Option<StoredEntry> {
        let name = self.names.name(role);
        match self.registry.partition(&name).lookup(key).await {
            Ok(entry) => {
                tracing::debug!(partition = %name, key = %key, hit = entry.is_some(), "cache lookup");
                entry
            }
            Err(e) => {
                tracing::warn!(partition = %name, key = %key, error = %e, "cache lookup failed, treating as miss");
                None
            }
        }
    }

    /// Store a successful response. Non-2xx responses are skipped.
    async fn put(&self, role: PartitionRole, request: &Request, response: &Response) {
        if !response.is_ok() {
            return;
        }

        let name = self.names.name(role);
        let key = RequestKey::get(&request.url);
        if let Err(e) = self.registry.partition(&name).put(&key, StoredEntry::capture(response)).await {
            tracing::warn!(partition = %name, key = %key, error = %e, "cache write failed");
        }
    }
}

/// Runs the caching algorithm picked by the classifier.
pub struct StrategyExecutor {
    store: Store,
    network: Arc<dyn Network>,
    classifier: Classifier,
    origin: Url,
}

impl StrategyExecutor {
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` when the classifier cannot be compiled
    /// from `config`.
    pub fn new(config: &AppConfig, registry: CacheRegistry, network: Arc<dyn Network>) -> Result<Self, Error> {
        let classifier = Classifier::from_config(config).map_err(|e| Error::InvalidInput(e.to_string()))?;
        let origin = config.origin_url().map_err(|e| Error::InvalidInput(e.to_string()))?;

        Ok(Self { store: Store { registry, names: config.partition_names() }, network, classifier, origin })
    }

    /// Route for a request, or `None` when it is not intercepted.
    pub fn route(&self, request: &Request) -> Option<Route> {
        self.classifier.route(request)
    }

    /// Classify and serve a request.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for requests that are not intercepted,
    /// otherwise whatever [`StrategyExecutor::execute`] returns.
    pub async fn handle(&self, request: &Request) -> Result<Handled, Error> {
        let route = self
            .route(request)
            .ok_or_else(|| Error::InvalidInput(format!("{} {} is not intercepted", request.method, request.url)))?;
        self.execute(request, route).await
    }

    /// Serve a request along an already chosen route.
    pub async fn execute(&self, request: &Request, route: Route) -> Result<Handled, Error> {
        tracing::debug!(url = %request.url, class = ?route.class, strategy = %route.strategy, "handling request");

        match route.strategy {
            StrategyKind::CacheFirst => self.cache_first(request, route).await,
            StrategyKind::NetworkFirst => Ok(self.network_first(request, route).await),
            StrategyKind::StaleWhileRevalidate => self.stale_while_revalidate(request, route).await,
        }
    }

    /// Fresh hit without touching the network; otherwise fetch, falling back
    /// to a cached entry of any age.
    pub async fn cache_first(&self, request: &Request, route: Route) -> Result<Handled, Error> {
        let cached = self.store.lookup(route.role, &RequestKey::get(&request.url)).await;

        if let Some(entry) = &cached
            && !expiry::is_expired(entry, route.max_age)
        {
            return Ok(Handled::new(entry.to_response(), ResponseSource::Cache, route));
        }

        match self.network.fetch(request).await {
            Ok(response) if response.is_ok() => {
                self.store.put(route.role, request, &response).await;
                Ok(Handled::new(response, ResponseSource::Network, route))
            }
            Ok(response) => match cached {
                Some(entry) => {
                    tracing::debug!(url = %request.url, status = response.status.as_u16(), "serving stale entry");
                    Ok(Handled::new(entry.into_response(), ResponseSource::StaleCache, route))
                }
                // The server is reachable; its answer is the best we have.
                None => Ok(Handled::new(response, ResponseSource::Network, route)),
            },
            Err(err) => match cached {
                Some(entry) => {
                    tracing::debug!(url = %request.url, error = %err, "serving stale entry");
                    Ok(Handled::new(entry.into_response(), ResponseSource::StaleCache, route))
                }
                None => Err(err),
            },
        }
    }

    /// Network, then cache, then a synthetic offline response.
    pub async fn network_first(&self, request: &Request, route: Route) -> Handled {
        let rejected = match self.network.fetch(request).await {
            Ok(response) if response.is_ok() => {
                self.store.put(route.role, request, &response).await;
                return Handled::new(response, ResponseSource::Network, route);
            }
            Ok(response) => {
                tracing::debug!(url = %request.url, status = response.status.as_u16(), "network-first got non-success");
                Some(response)
            }
            Err(err) => {
                tracing::debug!(url = %request.url, error = %err, "network-first fetch failed");
                None
            }
        };

        let cached = self.store.lookup(route.role, &RequestKey::get(&request.url)).await;

        match route.class {
            RequestClass::Api => match cached {
                Some(entry) if !expiry::is_expired(&entry, route.max_age) => {
                    Handled::new(entry.into_response(), ResponseSource::Cache, route)
                }
                _ => Handled::new(offline_json(), ResponseSource::Fallback, route),
            },
            RequestClass::Navigation => {
                if let Some(entry) = cached {
                    let source = cached_source(&entry, route);
                    return Handled::new(entry.into_response(), source, route);
                }
                if let Some(shell) = self.app_shell().await {
                    return Handled::new(shell.into_response(), ResponseSource::StaleCache, route);
                }
                Handled::new(offline_html(), ResponseSource::Fallback, route)
            }
            RequestClass::StaticAsset | RequestClass::Runtime => match (cached, rejected) {
                (Some(entry), _) => Handled::new(entry.into_response(), ResponseSource::StaleCache, route),
                (None, Some(response)) => Handled::new(response, ResponseSource::Network, route),
                (None, None) => Handled::new(offline_json(), ResponseSource::Fallback, route),
            },
        }
    }

    /// Serve any cached entry at once and refresh it in the background;
    /// on a miss, fetch inline.
    pub async fn stale_while_revalidate(&self, request: &Request, route: Route) -> Result<Handled, Error> {
        if let Some(entry) = self.store.lookup(route.role, &RequestKey::get(&request.url)).await {
            let source = cached_source(&entry, route);
            let mut handled = Handled::new(entry.into_response(), source, route);
            handled.revalidation = Some(self.revalidate(request.clone(), route.role));
            return Ok(handled);
        }

        let response = self.network.fetch(request).await?;
        self.store.put(route.role, request, &response).await;
        Ok(Handled::new(response, ResponseSource::Network, route))
    }

    fn revalidate(&self, request: Request, role: PartitionRole) -> Revalidation {
        let store = self.store.clone();
        let network = Arc::clone(&self.network);

        Revalidation::spawn(async move {
            match network.fetch(&request).await {
                Ok(response) if response.is_ok() => {
                    store.put(role, &request, &response).await;
                    tracing::debug!(url = %request.url, "revalidated");
                }
                Ok(response) => {
                    tracing::debug!(url = %request.url, status = response.status.as_u16(), "revalidation skipped");
                }
                Err(err) => {
                    tracing::debug!(url = %request.url, error = %err, "revalidation failed");
                }
            }
        })
    }

    /// Cached root document, static partition first.
    async fn app_shell(&self) -> Option<StoredEntry> {
        let root = self.origin.join("/").ok()?;
        let key = RequestKey::get(&root);
        for role in [PartitionRole::Static, PartitionRole::Dynamic] {
            if let Some(entry) = self.store.lookup(role, &key).await {
                return Some(entry);
            }
        }
        None
    }
}

fn cached_source(entry: &StoredEntry, route: Route) -> ResponseSource {
    match expiry::freshness(entry, route.max_age) {
        Freshness::Fresh => ResponseSource::Cache,
        Freshness::Stale => ResponseSource::StaleCache,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedNetwork;
    use chrono::{TimeDelta, Utc};
    use http::StatusCode;
    use shelter_core::MemoryStorage;

    const ORIGIN: &str = "https://app.example.com";
    const ICON: &str = "https://app.example.com/icons/icon-192x192.png";
    const FLIGHTS: &str = "https://api.aviationstack.com/v1/flights?flight_iata=BA117";
    const SCRIPT: &str = "https://app.example.com/_next/static/main.js";

    fn config() -> AppConfig {
        AppConfig { origin: ORIGIN.into(), ..Default::default() }
    }

    fn executor_with(storage: MemoryStorage) -> (StrategyExecutor, CacheRegistry, Arc<ScriptedNetwork>) {
        let registry = CacheRegistry::new(Arc::new(storage));
        let network = ScriptedNetwork::new();
        let executor = StrategyExecutor::new(&config(), registry.clone(), network.clone()).unwrap();
        (executor, registry, network)
    }

    fn executor() -> (StrategyExecutor, CacheRegistry, Arc<ScriptedNetwork>) {
        executor_with(MemoryStorage::new())
    }

    async fn seed(registry: &CacheRegistry, role: PartitionRole, url: &str, body: &str, age: TimeDelta) {
        let names = config().partition_names();
        let partition = registry.open(&names.name(role)).await.unwrap();
        let request = Request::get(url).unwrap();
        let entry = StoredEntry::capture_at(&Response::new(StatusCode::OK, body.to_string()), Utc::now() - age);
        partition.put(&request.key(), entry).await.unwrap();
    }

    async fn stored(registry: &CacheRegistry, role: PartitionRole, url: &str) -> Option<String> {
        let names = config().partition_names();
        let partition = registry.open(&names.name(role)).await.unwrap();
        let request = Request::get(url).unwrap();
        partition.lookup_request(&request).await.unwrap().map(|e| e.into_response().text())
    }

    fn navigation(url: &str) -> Request {
        Request::get(url).unwrap().navigate()
    }

    #[tokio::test]
    async fn test_cache_first_fresh_hit_skips_network() {
        let (executor, registry, network) = executor();
        seed(&registry, PartitionRole::Static, ICON, "png", TimeDelta::days(1)).await;

        let handled = executor.handle(&Request::get(ICON).unwrap()).await.unwrap();
        assert_eq!(handled.source, ResponseSource::Cache);
        assert_eq!(handled.response.text(), "png");
        assert_eq!(network.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_first_miss_fetches_and_stores() {
        let (executor, registry, network) = executor();
        network.ok(ICON, "png-bytes");

        let handled = executor.handle(&Request::get(ICON).unwrap()).await.unwrap();
        assert_eq!(handled.source, ResponseSource::Network);
        assert_eq!(handled.response.status, StatusCode::OK);
        assert_eq!(handled.response.text(), "png-bytes");

        let names = config().partition_names();
        let entry = registry
            .partition(&names.name(PartitionRole::Static))
            .lookup_request(&Request::get(ICON).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.status, StatusCode::OK);
        assert_eq!(entry.body.as_ref(), b"png-bytes");
        assert_eq!(network.calls(ICON), 1);
    }

    #[tokio::test]
    async fn test_lookup_miss_does_not_create_partition() {
        let (executor, registry, network) = executor();
        network.fail(SCRIPT);

        assert!(executor.handle(&Request::get(SCRIPT).unwrap()).await.is_err());
        assert!(registry.names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cache_first_expired_refetches_and_overwrites() {
        let (executor, registry, network) = executor();
        seed(&registry, PartitionRole::Static, ICON, "old", TimeDelta::days(31)).await;
        network.ok(ICON, "new");

        let handled = executor.handle(&Request::get(ICON).unwrap()).await.unwrap();
        assert_eq!(handled.source, ResponseSource::Network);
        assert_eq!(handled.response.text(), "new");
        assert_eq!(stored(&registry, PartitionRole::Static, ICON).await.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_cache_first_offline_serves_expired_entry() {
        let (executor, registry, network) = executor();
        seed(&registry, PartitionRole::Static, ICON, "old", TimeDelta::days(90)).await;
        network.fail(ICON);

        let handled = executor.handle(&Request::get(ICON).unwrap()).await.unwrap();
        assert_eq!(handled.source, ResponseSource::StaleCache);
        assert_eq!(handled.response.text(), "old");
    }

    #[tokio::test]
    async fn test_cache_first_miss_offline_propagates() {
        let (executor, _registry, network) = executor();
        network.fail(ICON);

        let err = executor.handle(&Request::get(ICON).unwrap()).await.unwrap_err();
        assert!(err.is_network());
    }

    #[tokio::test]
    async fn test_cache_first_non_success_without_entry_is_returned_unstored() {
        let (executor, registry, network) = executor();
        network.respond(ICON, StatusCode::NOT_FOUND, "missing");

        let handled = executor.handle(&Request::get(ICON).unwrap()).await.unwrap();
        assert_eq!(handled.response.status, StatusCode::NOT_FOUND);
        assert_eq!(stored(&registry, PartitionRole::Static, ICON).await, None);
    }

    #[tokio::test]
    async fn test_cache_first_non_success_falls_back_to_entry() {
        let (executor, registry, network) = executor();
        seed(&registry, PartitionRole::Static, ICON, "old", TimeDelta::days(90)).await;
        network.respond(ICON, StatusCode::BAD_GATEWAY, "");

        let handled = executor.handle(&Request::get(ICON).unwrap()).await.unwrap();
        assert_eq!(handled.source, ResponseSource::StaleCache);
        assert_eq!(handled.response.text(), "old");
    }

    #[tokio::test]
    async fn test_network_first_stores_in_dynamic() {
        let (executor, registry, network) = executor();
        network.ok(FLIGHTS, r#"{"data":[]}"#);

        let handled = executor.handle(&Request::get(FLIGHTS).unwrap()).await.unwrap();
        assert_eq!(handled.source, ResponseSource::Network);
        assert_eq!(stored(&registry, PartitionRole::Dynamic, FLIGHTS).await.as_deref(), Some(r#"{"data":[]}"#));
    }

    #[tokio::test]
    async fn test_api_offline_without_entry_is_503_json() {
        let (executor, _registry, network) = executor();
        network.fail(FLIGHTS);

        let handled = executor.handle(&Request::get(FLIGHTS).unwrap()).await.unwrap();
        assert_eq!(handled.source, ResponseSource::Fallback);
        assert_eq!(handled.response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            handled.response.text(),
            r#"{"error":"Network unavailable","message":"Please check your internet connection","offline":true}"#
        );
    }

    #[tokio::test]
    async fn test_api_offline_serves_entry_within_api_max_age() {
        let (executor, registry, network) = executor();
        seed(&registry, PartitionRole::Dynamic, FLIGHTS, "cached", TimeDelta::seconds(60)).await;
        network.fail(FLIGHTS);

        let handled = executor.handle(&Request::get(FLIGHTS).unwrap()).await.unwrap();
        assert_eq!(handled.source, ResponseSource::Cache);
        assert_eq!(handled.response.text(), "cached");
    }

    #[tokio::test]
    async fn test_api_offline_rejects_entry_past_api_max_age() {
        let (executor, registry, network) = executor();
        seed(&registry, PartitionRole::Dynamic, FLIGHTS, "cached", TimeDelta::minutes(10)).await;
        network.fail(FLIGHTS);

        let handled = executor.handle(&Request::get(FLIGHTS).unwrap()).await.unwrap();
        assert_eq!(handled.response.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_api_server_error_counts_as_failure() {
        let (executor, registry, network) = executor();
        seed(&registry, PartitionRole::Dynamic, FLIGHTS, "cached", TimeDelta::seconds(30)).await;
        network.respond(FLIGHTS, StatusCode::INTERNAL_SERVER_ERROR, "boom");

        let handled = executor.handle(&Request::get(FLIGHTS).unwrap()).await.unwrap();
        assert_eq!(handled.response.text(), "cached");
        assert_eq!(stored(&registry, PartitionRole::Dynamic, FLIGHTS).await.as_deref(), Some("cached"));
    }

    #[tokio::test]
    async fn test_navigation_offline_exact_entry() {
        let (executor, registry, network) = executor();
        let page = "https://app.example.com/chat/42";
        seed(&registry, PartitionRole::Dynamic, page, "<p>chat</p>", TimeDelta::days(5)).await;
        network.fail(page);

        let handled = executor.handle(&navigation(page)).await.unwrap();
        assert_eq!(handled.response.text(), "<p>chat</p>");
        assert_eq!(handled.source, ResponseSource::StaleCache);
    }

    #[tokio::test]
    async fn test_navigation_offline_app_shell() {
        let (executor, registry, network) = executor();
        seed(&registry, PartitionRole::Static, "https://app.example.com/", "<main>shell</main>", TimeDelta::zero())
            .await;
        network.fail("https://app.example.com/settings");

        let handled = executor.handle(&navigation("https://app.example.com/settings")).await.unwrap();
        assert_eq!(handled.response.text(), "<main>shell</main>");
    }

    #[tokio::test]
    async fn test_navigation_offline_inline_page() {
        let (executor, _registry, _network) = executor();

        let handled = executor.handle(&navigation("https://app.example.com/settings")).await.unwrap();
        assert_eq!(handled.source, ResponseSource::Fallback);
        assert_eq!(handled.response.status, StatusCode::OK);
        assert!(handled.response.content_type().is_some_and(|ct| ct.starts_with("text/html")));
        assert!(is_synthetic(&handled.response));
    }

    #[tokio::test]
    async fn test_swr_hit_returns_before_refresh_completes() {
        let (executor, registry, network) = executor();
        seed(&registry, PartitionRole::Runtime, SCRIPT, "v1", TimeDelta::hours(1)).await;
        network.ok(SCRIPT, "v2");
        let gate = network.gate();

        let handled = executor.handle(&Request::get(SCRIPT).unwrap()).await.unwrap();
        assert_eq!(handled.response.text(), "v1");
        assert_eq!(handled.source, ResponseSource::Cache);

        gate.notify_one();
        handled.revalidation.unwrap().settled().await;
        assert_eq!(stored(&registry, PartitionRole::Runtime, SCRIPT).await.as_deref(), Some("v2"));

        let next = executor.handle(&Request::get(SCRIPT).unwrap()).await.unwrap();
        assert_eq!(next.source, ResponseSource::Cache);
        assert_eq!(next.response.text(), "v2");
    }

    #[tokio::test]
    async fn test_swr_refresh_failure_keeps_entry() {
        let (executor, registry, network) = executor();
        seed(&registry, PartitionRole::Runtime, SCRIPT, "v1", TimeDelta::hours(1)).await;
        network.fail(SCRIPT);

        let handled = executor.handle(&Request::get(SCRIPT).unwrap()).await.unwrap();
        handled.revalidation.unwrap().settled().await;
        assert_eq!(stored(&registry, PartitionRole::Runtime, SCRIPT).await.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_swr_miss_fetches_inline() {
        let (executor, registry, network) = executor();
        network.ok(SCRIPT, "v1");

        let handled = executor.handle(&Request::get(SCRIPT).unwrap()).await.unwrap();
        assert_eq!(handled.source, ResponseSource::Network);
        assert!(handled.revalidation.is_none());
        assert_eq!(stored(&registry, PartitionRole::Runtime, SCRIPT).await.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_swr_miss_offline_propagates() {
        let (executor, _registry, _network) = executor();
        let err = executor.handle(&Request::get(SCRIPT).unwrap()).await.unwrap_err();
        assert!(err.is_network());
    }

    #[tokio::test]
    async fn test_swr_non_success_not_stored() {
        let (executor, registry, network) = executor();
        network.respond(SCRIPT, StatusCode::SERVICE_UNAVAILABLE, "down");

        let handled = executor.handle(&Request::get(SCRIPT).unwrap()).await.unwrap();
        assert_eq!(handled.response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(stored(&registry, PartitionRole::Runtime, SCRIPT).await, None);
    }

    #[tokio::test]
    async fn test_cache_write_failure_still_returns_response() {
        let (executor, _registry, network) = executor_with(MemoryStorage::new().with_max_entries(0));
        network.ok(FLIGHTS, "live");

        let handled = executor.handle(&Request::get(FLIGHTS).unwrap()).await.unwrap();
        assert_eq!(handled.source, ResponseSource::Network);
        assert_eq!(handled.response.text(), "live");
    }

    #[tokio::test]
    async fn test_handle_rejects_non_get() {
        let (executor, _registry, _network) = executor();
        let post = Request::new(http::Method::POST, Url::parse(FLIGHTS).unwrap());
        assert!(matches!(executor.handle(&post).await, Err(Error::InvalidInput(_))));
    }
}

//! Worker wired to a mock origin, shared by the tool tests.

use std::sync::Arc;

use shelter_client::{FetchConfig, HttpFetcher, RecordingHost, ServiceWorker};
use shelter_core::{AppConfig, CacheDb};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub(crate) const MANIFEST: [&str; 4] = ["/", "/manifest.json", "/icons/icon-192x192.png", "/icons/icon-512x512.png"];

pub(crate) struct TestApp {
    pub server: MockServer,
    pub worker: Arc<ServiceWorker>,
    pub db: CacheDb,
    pub host: Arc<RecordingHost>,
}

impl TestApp {
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server.uri())
    }
}

/// Origin serving every manifest asset as `asset {path}`.
pub(crate) async fn app() -> TestApp {
    let server = MockServer::start().await;
    for asset in MANIFEST {
        Mock::given(method("GET"))
            .and(path(asset))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("asset {asset}")))
            .mount(&server)
            .await;
    }

    let config = AppConfig { origin: server.uri(), ..Default::default() };
    let db = CacheDb::open_in_memory().await.unwrap();
    let network = Arc::new(HttpFetcher::new(FetchConfig::from(&config)).unwrap());
    let host = Arc::new(RecordingHost::new());
    let worker = Arc::new(ServiceWorker::new(config, Arc::new(db.clone()), network, host.clone()).unwrap());

    TestApp { server, worker, db, host }
}

/// Installed and activated against the mock origin.
pub(crate) async fn activated_app() -> TestApp {
    let app = app().await;
    app.worker.install().await.unwrap();
    app.worker.activate().await.unwrap();
    app
}

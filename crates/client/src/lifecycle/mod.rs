//! Lifecycle controller.
//!
//! Owns the caches, the network seam and the strategy executor, and reacts to
//! the platform's named signals: install, activate, fetch, sync, periodic
//! sync, push and notification click.
//!
//! ### State machine
//! - `Uninstalled -> Installing -> Installed -> Activating -> Activated`
//! - A failed install returns to the state it started from
//! - Installing again is allowed from any settled state and keeps an
//!   activated worker activated
//! - Requests are only intercepted once activated

pub mod host;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

use shelter_core::message::{normalize, resolve};
use shelter_core::{
    AppConfig, CacheRegistry, CacheStorage, Error, PartitionNames, PartitionRole, Request, RequestKey, StoredEntry,
};

use crate::fetch::Network;
use crate::strategy::{Handled, StrategyExecutor};
use crate::sync::Outbox;

pub use host::{ClientHost, HostEvent, Notification, RecordingHost, WindowClient};

const DEFAULT_PUSH_BODY: &str = "You have a new update";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Uninstalled,
    Installing,
    Installed,
    Activating,
    Activated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninstalled => "uninstalled",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
        })
    }
}

/// What the worker did with an intercepted request.
#[derive(Debug)]
pub enum FetchDisposition {
    /// Not ours; the platform should fetch it directly.
    Passthrough,
    Handled(Handled),
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub version: String,
    pub precached: usize,
    pub deleted_partitions: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivateReport {
    pub version: String,
    pub deleted_partitions: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub tag: String,
    /// False when the tag is not the configured sync tag.
    pub handled: bool,
    pub replayed: usize,
    pub requeued: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub tag: String,
    pub handled: bool,
    pub refreshed: usize,
    pub failed: usize,
}

/// Outcome of a notification click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClickOutcome {
    Focused { window: WindowClient },
    Opened { window: WindowClient },
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub state: LifecycleState,
    pub version: String,
    pub partitions: Vec<String>,
    pub outbox: usize,
}

/// Push payload as sent by the application server. Any field may be absent.
#[derive(Debug, Default, Deserialize)]
struct PushPayload {
    title: Option<String>,
    body: Option<String>,
    url: Option<String>,
    icon: Option<String>,
}

/// The offline caching worker for one origin and release.
pub struct ServiceWorker {
    config: AppConfig,
    origin: Url,
    names: PartitionNames,
    registry: CacheRegistry,
    network: Arc<dyn Network>,
    executor: StrategyExecutor,
    outbox: Outbox,
    host: Arc<dyn ClientHost>,
    state: RwLock<LifecycleState>,
}

impl ServiceWorker {
    /// Build an uninstalled worker.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the origin or the runtime patterns in
    /// `config` are invalid.
    pub fn new(
        config: AppConfig, storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>, host: Arc<dyn ClientHost>,
    ) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidInput(e.to_string()))?;
        let registry = CacheRegistry::new(storage);
        let executor = StrategyExecutor::new(&config, registry.clone(), Arc::clone(&network))?;

        Ok(Self {
            names: config.partition_names(),
            outbox: Outbox::new(config.outbox_capacity),
            config,
            origin,
            registry,
            network,
            executor,
            host,
            state: RwLock::new(LifecycleState::Uninstalled),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    pub fn names(&self) -> &PartitionNames {
        &self.names
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    pub async fn status(&self) -> WorkerStatus {
        WorkerStatus {
            state: self.state().await,
            version: self.names.version().to_string(),
            partitions: self.names.current(),
            outbox: self.outbox.len().await,
        }
    }

    /// Pre-cache the static manifest and clear out old partitions.
    ///
    /// All or nothing: if any manifest asset cannot be fetched with a 2xx
    /// status, nothing is written and the previous state is restored.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        let previous = {
            let mut state = self.state.write().await;
            match *state {
                LifecycleState::Installing | LifecycleState::Activating => {
                    return Err(Error::InvalidTransition(format!("cannot install while {}", *state)));
                }
                settled => {
                    *state = LifecycleState::Installing;
                    settled
                }
            }
        };

        tracing::info!(version = %self.names.version(), assets = self.config.static_assets.len(), "installing");

        match self.precache().await {
            Ok(report) => {
                let next = match previous {
                    LifecycleState::Activated => LifecycleState::Activated,
                    _ => LifecycleState::Installed,
                };
                *self.state.write().await = next;
                self.host.skip_waiting().await;
                tracing::info!(
                    version = %report.version,
                    precached = report.precached,
                    deleted = report.deleted_partitions,
                    "installed"
                );
                Ok(report)
            }
            Err(err) => {
                *self.state.write().await = previous;
                tracing::warn!(error = %err, state = %previous, "install failed");
                Err(err)
            }
        }
    }

    async fn precache(&self) -> Result<InstallReport, Error> {
        for name in self.names.current() {
            self.registry.open(&name).await?;
        }

        let mut fetched = Vec::with_capacity(self.config.static_assets.len());
        for request in self.manifest_requests()? {
            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|e| Error::InstallFailed(format!("{}: {e}", request.url)))?;
            if !response.is_ok() {
                return Err(Error::InstallFailed(format!("{} returned {}", request.url, response.status)));
            }
            fetched.push((request, response));
        }

        let statics = self.registry.open(&self.names.name(PartitionRole::Static)).await?;
        for (request, response) in &fetched {
            statics
                .put(&RequestKey::get(&request.url), StoredEntry::capture(response))
                .await
                .map_err(|e| Error::InstallFailed(format!("storing {}: {e}", request.url)))?;
        }

        let deleted_partitions = self.delete_stale_partitions().await?;

        Ok(InstallReport { version: self.names.version().to_string(), precached: fetched.len(), deleted_partitions })
    }

    /// Delete stale partitions and take control of open clients.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        {
            let mut state = self.state.write().await;
            if *state != LifecycleState::Installed {
                return Err(Error::InvalidTransition(format!("cannot activate while {}", *state)));
            }
            *state = LifecycleState::Activating;
        }

        let deleted_partitions = match self.delete_stale_partitions().await {
            Ok(deleted) => deleted,
            Err(err) => {
                *self.state.write().await = LifecycleState::Installed;
                return Err(err);
            }
        };

        self.host.claim_clients().await;
        *self.state.write().await = LifecycleState::Activated;
        tracing::info!(version = %self.names.version(), deleted = deleted_partitions, "activated");

        Ok(ActivateReport { version: self.names.version().to_string(), deleted_partitions })
    }

    /// Intercept a request.
    pub async fn fetch(&self, request: &Request) -> Result<FetchDisposition, Error> {
        if self.state().await != LifecycleState::Activated {
            return Ok(FetchDisposition::Passthrough);
        }

        let Some(route) = self.executor.route(request) else {
            return Ok(FetchDisposition::Passthrough);
        };

        Ok(FetchDisposition::Handled(self.executor.execute(request, route).await?))
    }

    /// Serve a request end to end, fetching passthrough requests directly.
    ///
    /// A mutating passthrough that fails at the network is queued for the
    /// next background sync; the error is still returned.
    pub async fn respond(&self, request: Request) -> Result<Handled, Error> {
        if let FetchDisposition::Handled(handled) = self.fetch(&request).await? {
            return Ok(handled);
        }

        match self.network.fetch(&request).await {
            Ok(response) => Ok(Handled::passthrough(response)),
            Err(err) if err.is_network() && request.is_mutating() && request.is_http() => {
                tracing::info!(method = %request.method, url = %request.url, "queued for background sync");
                self.outbox.push(request).await;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Replay the outbox. Never fails; requests that still cannot be
    /// delivered are queued again.
    pub async fn sync(&self, tag: &str) -> SyncReport {
        if tag != self.config.sync_tag {
            tracing::debug!(tag, "ignoring sync for unknown tag");
            return SyncReport {
                tag: tag.to_string(),
                handled: false,
                replayed: 0,
                requeued: 0,
                pending: self.outbox.len().await,
            };
        }

        let queued = self.outbox.drain().await;
        let mut replayed = 0;
        let mut requeued = 0;

        for request in queued {
            match self.network.fetch(&request).await {
                Ok(response) if !response.status.is_server_error() => {
                    tracing::debug!(url = %request.url, status = response.status.as_u16(), "replayed");
                    replayed += 1;
                }
                Ok(response) => {
                    tracing::warn!(url = %request.url, status = response.status.as_u16(), "replay rejected, requeueing");
                    self.outbox.push(request).await;
                    requeued += 1;
                }
                Err(err) => {
                    tracing::warn!(url = %request.url, error = %err, "replay failed, requeueing");
                    self.outbox.push(request).await;
                    requeued += 1;
                }
            }
        }

        tracing::info!(tag, replayed, requeued, "background sync finished");
        SyncReport { tag: tag.to_string(), handled: true, replayed, requeued, pending: self.outbox.len().await }
    }

    /// Re-fetch the static manifest and overwrite the static partition.
    pub async fn periodic_sync(&self, tag: &str) -> RefreshReport {
        if tag != self.config.periodic_sync_tag {
            tracing::debug!(tag, "ignoring periodic sync for unknown tag");
            return RefreshReport { tag: tag.to_string(), handled: false, refreshed: 0, failed: 0 };
        }

        let requests = match self.manifest_requests() {
            Ok(requests) => requests,
            Err(err) => {
                tracing::warn!(error = %err, "cannot resolve static manifest");
                return RefreshReport { tag: tag.to_string(), handled: true, refreshed: 0, failed: 0 };
            }
        };

        let mut refreshed = 0;
        let mut failed = 0;

        for request in &requests {
            match self.refresh_static(request).await {
                Ok(()) => refreshed += 1,
                Err(err) => {
                    tracing::warn!(url = %request.url, error = %err, "periodic refresh failed");
                    failed += 1;
                }
            }
        }

        tracing::info!(tag, refreshed, failed, "periodic sync finished");
        RefreshReport { tag: tag.to_string(), handled: true, refreshed, failed }
    }

    async fn refresh_static(&self, request: &Request) -> Result<(), Error> {
        let response = self.network.fetch(request).await?;
        if !response.is_ok() {
            return Err(Error::Network(format!("status {}", response.status)));
        }

        let statics = self.registry.open(&self.names.name(PartitionRole::Static)).await?;
        statics.put(&RequestKey::get(&request.url), StoredEntry::capture(&response)).await
    }

    /// Turn a push payload into a notification and show it.
    ///
    /// JSON objects may set `title`, `body`, `url` and `icon`; anything else
    /// becomes the body.
    pub async fn push(&self, payload: Option<&str>) -> Result<Notification, Error> {
        let payload = match payload {
            None => PushPayload::default(),
            Some(text) => serde_json::from_str::<PushPayload>(text)
                .unwrap_or_else(|_| PushPayload { body: Some(text.to_string()), ..Default::default() }),
        };

        let url = self.resolve(payload.url.as_deref().unwrap_or("/"))?;
        let notification = Notification {
            title: payload.title.unwrap_or_else(|| self.config.app_name.clone()),
            body: payload.body.unwrap_or_else(|| DEFAULT_PUSH_BODY.to_string()),
            icon: payload.icon.unwrap_or_else(|| self.config.notification_icon.clone()),
            url,
        };

        self.host.show_notification(&notification).await;
        Ok(notification)
    }

    /// Focus a window already showing `url`, or open one.
    pub async fn notification_click(&self, url: Option<&str>) -> Result<ClickOutcome, Error> {
        let target = self.resolve(url.unwrap_or("/"))?;

        let existing = self
            .host
            .windows()
            .await
            .into_iter()
            .find(|window| normalize(&window.url) == target);

        match existing {
            Some(window) => {
                self.host.focus_window(window.id).await;
                Ok(ClickOutcome::Focused { window })
            }
            None => Ok(ClickOutcome::Opened { window: self.host.open_window(&target).await }),
        }
    }

    fn resolve(&self, input: &str) -> Result<Url, Error> {
        resolve(&self.origin, input).map_err(|e| Error::InvalidUrl(format!("{input}: {e}")))
    }

    fn manifest_requests(&self) -> Result<Vec<Request>, Error> {
        self.config
            .static_assets
            .iter()
            .map(|path| Ok(Request::new(http::Method::GET, self.resolve(path)?).reload()))
            .collect()
    }

    async fn delete_stale_partitions(&self) -> Result<u64, Error> {
        let deleted = self.registry.delete_where(|name| self.names.is_stale(name)).await?;
        if deleted > 0 {
            tracing::info!(deleted, "deleted stale partitions");
        }
        Ok(deleted)
    }
}

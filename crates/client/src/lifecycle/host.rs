//! Platform surface the worker signals into.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use url::Url;

/// A notification ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    /// Opened when the notification is clicked.
    pub url: Url,
}

/// An open window controlled by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowClient {
    pub id: u64,
    pub url: Url,
}

/// Windows, notifications and control claims.
///
/// Calls are fire-and-forget; a host that cannot honour one logs it.
#[async_trait]
pub trait ClientHost: Send + Sync {
    /// Activate the new version without waiting for old clients to close.
    async fn skip_waiting(&self);

    /// Take control of already open clients.
    async fn claim_clients(&self);

    async fn show_notification(&self, notification: &Notification);

    async fn windows(&self) -> Vec<WindowClient>;

    async fn focus_window(&self, id: u64);

    async fn open_window(&self, url: &Url) -> WindowClient;
}

/// Something the worker asked the host to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostEvent {
    SkipWaiting,
    ClaimClients,
    Notification(Notification),
    Focus { id: u64 },
    Open { id: u64, url: Url },
}

/// Events and windows kept by a [`RecordingHost`] before the oldest are dropped.
pub const DEFAULT_HOST_HISTORY: usize = 256;

#[derive(Default)]
struct HostState {
    events: VecDeque<HostEvent>,
    windows: VecDeque<WindowClient>,
    next_id: u64,
}

/// In-process host that keeps its windows in memory and records every call.
///
/// Both the event log and the window list are bounded; the oldest entry goes
/// first.
pub struct RecordingHost {
    state: Mutex<HostState>,
    history: usize,
}

impl Default for RecordingHost {
    fn default() -> Self {
        Self::with_history(DEFAULT_HOST_HISTORY)
    }
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(history: usize) -> Self {
        Self { state: Mutex::new(HostState::default()), history: history.max(1) }
    }

    /// Register an already open window.
    pub async fn add_window(&self, url: Url) -> WindowClient {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let window = WindowClient { id: state.next_id, url };
        if state.windows.len() >= self.history {
            state.windows.pop_front();
        }
        state.windows.push_back(window.clone());
        window
    }

    pub async fn events(&self) -> Vec<HostEvent> {
        self.state.lock().await.events.iter().cloned().collect()
    }

    async fn record(&self, event: HostEvent) {
        tracing::info!(event = ?event, "host event");
        let mut state = self.state.lock().await;
        if state.events.len() >= self.history {
            state.events.pop_front();
        }
        state.events.push_back(event);
    }
}

#[async_trait]
impl ClientHost for RecordingHost {
    async fn skip_waiting(&self) {
        self.record(HostEvent::SkipWaiting).await;
    }

    async fn claim_clients(&self) {
        self.record(HostEvent::ClaimClients).await;
    }

    async fn show_notification(&self, notification: &Notification) {
        self.record(HostEvent::Notification(notification.clone())).await;
    }

    async fn windows(&self) -> Vec<WindowClient> {
        self.state.lock().await.windows.iter().cloned().collect()
    }

    async fn focus_window(&self, id: u64) {
        self.record(HostEvent::Focus { id }).await;
    }

    async fn open_window(&self, url: &Url) -> WindowClient {
        let window = self.add_window(url.clone()).await;
        self.record(HostEvent::Open { id: window.id, url: url.clone() }).await;
        window
    }
}

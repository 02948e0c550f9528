//! Lifecycle signal tools: install, activate, sync, periodic sync, push,
//! notification click and status.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shelter_client::{ServiceWorker, WorkerStatus};
use shelter_core::CacheDb;
use shelter_core::cache::PartitionStats;

use super::json_result;

/// Parameters for sw_sync and sw_periodic_sync.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SyncParams {
    /// Tag the application registered the sync under.
    pub tag: String,
}

/// Parameters for sw_push.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PushParams {
    /// Raw push payload: a JSON object with title/body/url/icon, or plain text.
    #[serde(default)]
    pub payload: Option<String>,
}

/// Parameters for sw_notification_click.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct NotificationClickParams {
    /// URL carried by the notification (default: "/").
    #[serde(default)]
    pub url: Option<String>,
}

/// Output from sw_status.
#[derive(Debug, Clone, Serialize)]
pub struct StatusOutput {
    #[serde(flatten)]
    pub worker: WorkerStatus,
    /// Entry counts and bytes for every stored partition.
    pub storage: Vec<PartitionStats>,
}

pub async fn install_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    json_result(&worker.install().await?)
}

pub async fn activate_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    json_result(&worker.activate().await?)
}

pub async fn sync_impl(worker: &ServiceWorker, params: SyncParams) -> Result<CallToolResult, McpError> {
    json_result(&worker.sync(&params.tag).await)
}

pub async fn periodic_sync_impl(worker: &ServiceWorker, params: SyncParams) -> Result<CallToolResult, McpError> {
    json_result(&worker.periodic_sync(&params.tag).await)
}

pub async fn push_impl(worker: &ServiceWorker, params: PushParams) -> Result<CallToolResult, McpError> {
    json_result(&worker.push(params.payload.as_deref()).await?)
}

pub async fn notification_click_impl(
    worker: &ServiceWorker, params: NotificationClickParams,
) -> Result<CallToolResult, McpError> {
    json_result(&worker.notification_click(params.url.as_deref()).await?)
}

pub async fn status_impl(worker: &ServiceWorker, db: &CacheDb) -> Result<CallToolResult, McpError> {
    let output = StatusOutput { worker: worker.status().await, storage: db.partition_stats().await? };
    json_result(&output)
}

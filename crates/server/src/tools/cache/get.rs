//! cache_get tool implementation.
//!
//! Reads one stored entry without touching the network.

use chrono::{DateTime, Utc};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shelter_client::ServiceWorker;
use shelter_core::message::resolve;
use shelter_core::{Error, RequestKey};

use super::partition_name;
use crate::tools::json_result;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Role (static, dynamic, runtime) or full partition name.
    pub partition: String,

    /// Request URL, absolute or relative to the worker origin.
    pub url: String,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize)]
pub struct CacheGetOutput {
    pub partition: String,
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
    /// Age in whole seconds, if the capture time is known.
    pub age_secs: Option<i64>,
    pub body: String,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(worker: &ServiceWorker, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let name = partition_name(worker, &params.partition);
    let url = resolve(worker.origin(), &params.url).map_err(|e| Error::InvalidUrl(format!("{}: {e}", params.url)))?;

    let registry = worker.registry();
    if !registry.names().await?.contains(&name) {
        return Err(Error::CacheMiss(format!("no partition named {name}")).into());
    }

    let entry = registry
        .open(&name)
        .await?
        .lookup(&RequestKey::get(&url))
        .await?
        .ok_or_else(|| Error::CacheMiss(format!("{url} not in {name}")))?;

    let captured_at = entry.captured_at();
    let response = entry.into_response();
    let output = CacheGetOutput {
        partition: name,
        url: url.to_string(),
        status: response.status.as_u16(),
        content_type: response.content_type().map(str::to_string),
        captured_at,
        age_secs: captured_at.map(|t| (Utc::now() - t).num_seconds()),
        body: response.text(),
    };

    tracing::debug!(partition = %output.partition, url = %output.url, "cache_get hit");
    json_result(&output)
}

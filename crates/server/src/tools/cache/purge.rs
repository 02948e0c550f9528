//! cache_purge tool implementation.
//!
//! Drops whole partitions: a named one, every stale one, or both.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shelter_client::ServiceWorker;

use super::partition_name;
use crate::error::ToolError;
use crate::tools::json_result;

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Role (static, dynamic, runtime) or full partition name to drop.
    #[serde(default)]
    pub partition: Option<String>,

    /// Drop every partition from an older version.
    #[serde(default)]
    pub stale_only: bool,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of partitions deleted.
    pub deleted: u64,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(worker: &ServiceWorker, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    if params.partition.is_none() && !params.stale_only {
        return Err(ToolError::InvalidInput("At least one of partition or stale_only must be specified".into()).into());
    }

    let registry = worker.registry();
    let mut deleted = 0u64;

    if params.stale_only {
        let names = worker.names();
        deleted += registry.delete_where(|name| names.is_stale(name)).await?;
    }

    if let Some(partition) = params.partition.as_deref() {
        let target = partition_name(worker, partition);
        deleted += registry.delete_where(|name| name == target).await?;
    }

    tracing::info!(deleted, "purged partitions");
    json_result(&CachePurgeOutput { deleted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::result_json;
    use crate::tools::testing::activated_app;

    #[tokio::test]
    async fn test_purge_stale() {
        let app = activated_app().await;
        for name in ["shelter-static-v0", "shelter-runtime-v0", "unrelated"] {
            app.worker.registry().open(name).await.unwrap();
        }

        let params = CachePurgeParams { partition: None, stale_only: true };
        let output = result_json(&purge_impl(&app.worker, params).await.unwrap());
        assert_eq!(output["deleted"], 2);

        let names = app.worker.registry().names().await.unwrap();
        assert!(names.contains(&"unrelated".to_string()));
    }

    #[tokio::test]
    async fn test_purge_by_role() {
        let app = activated_app().await;
        let params = CachePurgeParams { partition: Some("static".into()), stale_only: false };

        let output = result_json(&purge_impl(&app.worker, params).await.unwrap());
        assert_eq!(output["deleted"], 1);
        assert!(!app.worker.registry().names().await.unwrap().contains(&"shelter-static-v1".to_string()));
    }

    #[tokio::test]
    async fn test_purge_no_params() {
        let app = activated_app().await;
        let result = purge_impl(&app.worker, CachePurgeParams::default()).await;
        assert!(result.is_err());
    }
}

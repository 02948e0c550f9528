//! sw_fetch tool implementation.
//!
//! Runs a request through the worker exactly as an intercepted page request
//! would: routed strategy when activated, direct network otherwise.

use http::Method;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shelter_client::{ResponseSource, ServiceWorker, strategy::is_synthetic};
use shelter_core::message::resolve;
use shelter_core::{Error, Request, RequestClass, StrategyKind};

use super::json_result;
use crate::error::ToolError;

/// Input parameters for sw_fetch.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwFetchParams {
    /// URL to request, absolute or relative to the worker origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Optional Accept header.
    #[serde(default)]
    pub accept: Option<String>,

    /// Mark the request as a top-level navigation.
    #[serde(default)]
    pub navigate: bool,

    /// Force a reload that bypasses intermediate HTTP caches.
    #[serde(default)]
    pub reload: bool,

    /// Request body for mutating methods.
    #[serde(default)]
    pub body: Option<String>,

    /// Wait for a stale-while-revalidate refresh before returning.
    #[serde(default)]
    pub wait_revalidation: bool,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for sw_fetch.
#[derive(Debug, Clone, Serialize)]
pub struct SwFetchOutput {
    pub url: String,
    pub status: u16,
    pub source: ResponseSource,
    pub class: Option<RequestClass>,
    pub strategy: Option<StrategyKind>,
    /// Partition the strategy read from and wrote to.
    pub partition: Option<String>,
    pub content_type: Option<String>,
    /// Synthetic offline response.
    pub offline: bool,
    /// A background refresh was started.
    pub revalidating: bool,
    pub body: String,
}

/// Implementation of the sw_fetch tool.
pub async fn fetch_impl(worker: &ServiceWorker, params: SwFetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(ToolError::InvalidInput("url cannot be empty".into()).into());
    }

    let method: Method = params
        .method
        .to_ascii_uppercase()
        .parse()
        .map_err(|_| ToolError::InvalidInput(format!("unsupported method: {}", params.method)))?;

    let url = resolve(worker.origin(), &params.url).map_err(|e| Error::InvalidUrl(format!("{}: {e}", params.url)))?;

    let mut request = Request::new(method, url);
    if let Some(accept) = params.accept.as_deref() {
        request = request.with_accept(accept)?;
    }
    if params.navigate {
        request = request.navigate();
    }
    if params.reload {
        request = request.reload();
    }
    if let Some(body) = params.body {
        request = request.with_body(body);
    }

    let url = request.url.to_string();
    let mut handled = worker.respond(request).await?;

    let revalidating = handled.revalidation.is_some();
    if params.wait_revalidation
        && let Some(revalidation) = handled.revalidation.take()
    {
        revalidation.settled().await;
    }

    let route = handled.route;
    let response = handled.response;
    let output = SwFetchOutput {
        url,
        status: response.status.as_u16(),
        source: handled.source,
        class: route.map(|r| r.class),
        strategy: route.map(|r| r.strategy),
        partition: route.map(|r| worker.names().name(r.role)),
        content_type: response.content_type().map(str::to_string),
        offline: is_synthetic(&response),
        revalidating,
        body: response.text(),
    };

    json_result(&output)
}

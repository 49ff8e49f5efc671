//! sw_fetch tool implementation.
//!
//! Dispatches a fetch event as if the page `client` had issued it.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use offcache_client::resolve;
use offcache_core::Request;
use offcache_worker::Source;

use super::json_result;
use crate::error::ToolError;
use crate::state::AppState;

/// Parameters for the sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwFetchParams {
    /// Absolute URL, or a path resolved against the origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default)]
    pub method: Option<String>,

    /// Client (page) issuing the request. Defaults to the startup client.
    #[serde(default)]
    pub client: Option<u64>,

    /// Request headers sent to the network.
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwFetchOutput {
    pub url: String,
    pub method: String,
    pub source: Source,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Body decoded as UTF-8, lossy.
    pub body: String,
}

pub async fn fetch_impl(state: &AppState, params: SwFetchParams) -> Result<CallToolResult, McpError> {
    let url = resolve(&state.origin, &params.url).map_err(ToolError::from)?;
    let method = params.method.as_deref().unwrap_or("GET").trim();
    if method.is_empty() {
        return Err(ToolError::InvalidInput("method must not be empty".into()).into());
    }

    let request = params
        .headers
        .unwrap_or_default()
        .iter()
        .fold(Request::new(method, url), |request, (name, value)| request.with_header(name, value));
    let client = params.client.unwrap_or(state.client);

    tracing::debug!(client, method = %request.method, url = %request.url, "sw_fetch");
    let served = state.queue.fetch(client, request.clone()).await?;

    let output = SwFetchOutput {
        url: request.url.to_string(),
        method: request.method,
        source: served.source,
        status: served.response.status,
        body: served.response.text(),
        headers: served.response.headers,
    };
    Ok(json_result(&output)?)
}

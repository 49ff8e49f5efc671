//! cache_get tool implementation.
//!
//! Retrieves one stored response by URL.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use offcache_client::resolve;
use offcache_core::{Error, Request, RequestKey};

use crate::error::ToolError;
use crate::state::AppState;
use crate::tools::json_result;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// URL of the stored GET request, absolute or relative to the origin.
    pub url: String,

    /// Generation to read. Defaults to the active version.
    #[serde(default)]
    pub generation: Option<String>,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize)]
pub struct CacheGetOutput {
    pub generation: String,
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(state: &AppState, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let url = resolve(&state.origin, &params.url).map_err(ToolError::from)?;
    let generation = match params.generation {
        Some(name) => name,
        None => state.current_generation().await?,
    };

    let key = RequestKey::for_request(&Request::get(url));
    let response = state
        .storage
        .get(&generation, &key)
        .await?
        .ok_or_else(|| Error::CacheMiss(key.to_string()))?;

    let output = CacheGetOutput {
        generation,
        url: key.url,
        status: response.status,
        body: response.text(),
        headers: response.headers,
    };
    Ok(json_result(&output)?)
}

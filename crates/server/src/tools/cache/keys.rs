//! cache_keys tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use crate::tools::json_result;

/// Parameters for the cache_keys tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheKeysParams {
    /// Generation to list. Defaults to the active version.
    #[serde(default)]
    pub generation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheKeyEntry {
    pub method: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheKeysOutput {
    pub generation: String,
    pub keys: Vec<CacheKeyEntry>,
}

/// List the stored request keys of a generation, in insertion order.
pub async fn keys_impl(state: &AppState, params: CacheKeysParams) -> Result<CallToolResult, McpError> {
    let generation = match params.generation {
        Some(name) => name,
        None => state.current_generation().await?,
    };

    let keys = state
        .storage
        .keys(&generation)
        .await?
        .into_iter()
        .map(|k| CacheKeyEntry { method: k.method, url: k.url })
        .collect();

    Ok(json_result(&CacheKeysOutput { generation, keys })?)
}

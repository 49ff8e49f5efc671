//! MCP tool implementations.
//!
//! Lifecycle tools drive the worker host; cache tools read stored
//! generations directly.

pub mod cache;
pub mod fetch;
pub mod lifecycle;

pub use fetch::{SwFetchParams, fetch_impl};
pub use lifecycle::{SwActivateParams, SwInstallParams, SwStatusParams, activate_impl, install_impl, status_impl};

use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

use offcache_core::Error;

/// Pretty JSON result, the shape every tool returns.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, Error> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

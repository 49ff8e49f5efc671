//! sw_install, sw_activate and sw_status.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use offcache_worker::{ActivateReport, ClientInfo, InstallReport, WorkerInfo};

use super::json_result;
use crate::state::AppState;

/// Parameters for the sw_install tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SwInstallParams {
    /// Version name, which is also the cache generation. Defaults to the
    /// configured `cache_name`.
    #[serde(default)]
    pub cache_name: Option<String>,

    /// Asset paths to precache, relative to the origin. Defaults to the
    /// configured list.
    #[serde(default)]
    pub assets: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwInstallOutput {
    pub install: InstallReport,
    /// Present when the new version was activated right after install.
    pub activate: Option<ActivateReport>,
}

/// Parameters for the sw_activate tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SwActivateParams {}

/// Parameters for the sw_status tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SwStatusParams {}

#[derive(Debug, Clone, Serialize)]
pub struct SwStatusOutput {
    pub active: Option<WorkerInfo>,
    pub waiting: Option<WorkerInfo>,
    pub clients: Vec<ClientInfo>,
    /// Client used when a fetch names none.
    pub default_client: u64,
    /// Generations present in storage, oldest first.
    pub generations: Vec<String>,
}

/// Install a new worker version and promote it when the host allows.
pub async fn install_impl(state: &AppState, params: SwInstallParams) -> Result<CallToolResult, McpError> {
    let mut config = state.config.clone();
    if let Some(name) = params.cache_name {
        config.cache_name = name;
    }
    if let Some(assets) = params.assets {
        config.assets = assets;
    }

    let worker = state.worker_for(&config)?;
    let registration = state.queue.register(worker).await?;

    let output = SwInstallOutput { install: registration.install, activate: registration.activate };
    Ok(json_result(&output)?)
}

/// Activate the waiting worker.
pub async fn activate_impl(state: &AppState, _params: SwActivateParams) -> Result<CallToolResult, McpError> {
    let report = state.queue.activate().await?;
    Ok(json_result(&report)?)
}

pub async fn status_impl(state: &AppState, _params: SwStatusParams) -> Result<CallToolResult, McpError> {
    let status = state.queue.status().await?;
    let generations = state.storage.list().await?;

    let output = SwStatusOutput {
        active: status.active,
        waiting: status.waiting,
        clients: status.clients,
        default_client: state.client,
        generations,
    };
    Ok(json_result(&output)?)
}

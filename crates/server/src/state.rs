//! Shared state behind every tool call.

use std::sync::Arc;

use offcache_client::{FetchConfig, HttpNetwork, Network};
use offcache_core::{AppConfig, CacheStorage, Error, MemoryStorage, SqliteStorage};
use offcache_worker::{ClientId, EventQueue, Host, OfflineWorker};
use url::Url;

use crate::error::ToolError;

/// The host, its storage and the page the tools act for.
pub struct AppState {
    pub config: AppConfig,
    pub origin: Url,
    pub storage: Arc<dyn CacheStorage>,
    pub network: Arc<dyn Network>,
    pub queue: EventQueue,
    /// Client opened at startup, used when a call names none.
    pub client: ClientId,
}

impl AppState {
    /// Start a host over `storage` and `network` and open the default
    /// client. No worker is installed yet.
    pub async fn new(
        config: AppConfig, storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>,
    ) -> Result<Self, anyhow::Error> {
        let origin = config.origin_url()?;
        let (queue, _dispatcher) = EventQueue::spawn(Host::new(network.clone()));
        let client = queue.open_client().await?;
        Ok(Self { config, origin, storage, network, queue, client })
    }

    /// Open the configured storage and HTTP network, then register the
    /// configured worker version.
    ///
    /// A failed install is logged, not fatal: pages are then served straight
    /// from the network until a later install succeeds.
    pub async fn boot(config: AppConfig) -> Result<Self, anyhow::Error> {
        let storage: Arc<dyn CacheStorage> = if config.in_memory {
            Arc::new(MemoryStorage::new())
        } else {
            Arc::new(SqliteStorage::open(&config.db_path).await?)
        };
        let network: Arc<dyn Network> = Arc::new(HttpNetwork::new(FetchConfig::from(&config))?);

        let state = Self::new(config, storage, network).await?;

        match state.queue.register(state.worker_for(&state.config)?).await {
            Ok(registration) => tracing::info!(
                version = %registration.install.version,
                stored = registration.install.stored,
                activated = registration.activate.is_some(),
                "worker registered"
            ),
            Err(e) => tracing::warn!("initial install failed, requests go to the network: {e}"),
        }

        Ok(state)
    }

    /// Build a worker version from `config` against this state's services.
    pub fn worker_for(&self, config: &AppConfig) -> Result<OfflineWorker, ToolError> {
        config.validate()?;
        Ok(OfflineWorker::from_config(config, self.storage.clone(), self.network.clone())?)
    }

    /// Generation the tools read when none is named: the active version, or
    /// the configured one before any activation.
    pub async fn current_generation(&self) -> Result<String, Error> {
        let status = self.queue.status().await?;
        Ok(status
            .active
            .map(|a| a.version)
            .unwrap_or_else(|| self.config.cache_name.clone()))
    }
}

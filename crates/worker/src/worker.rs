//! The offline cache router: install, activate and fetch handlers for one
//! worker version.
//!
//! ### Install
//! Fetch every asset, then store every response under the version's cache
//! generation. Any failed fetch or non-ok status fails the whole install
//! before anything is written.
//!
//! ### Activate
//! Delete every generation except the current one. Deletions are
//! independent; a failed one is reported as leaked and retried by the next
//! activation.
//!
//! ### Fetch
//! Dynamic URLs go network first with the offline JSON as fallback. Static
//! URLs go cache first; a miss is fetched once and written back by a
//! detached task.

use std::sync::Arc;

use futures_util::future::{join_all, try_join_all};
use serde::Serialize;
use url::Url;

use offcache_client::Network;
use offcache_core::{AppConfig, CacheStorage, ConfigError, Error, Request, RequestKey, Response};

use crate::background::Background;
use crate::offline::offline_response;
use crate::route::{RoutePredicate, Strategy, UrlMarkers};

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Network,
    Cache,
    Offline,
    /// No active worker controlled the client; the request went straight out.
    Passthrough,
}

/// A response handed back to the page.
#[derive(Debug, Clone)]
pub struct Served {
    pub response: Response,
    pub source: Source,
}

impl Served {
    fn new(response: Response, source: Source) -> Self {
        Self { response, source }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub version: String,
    pub stored: usize,
    /// The version asks to be activated without waiting for old clients.
    pub skip_waiting: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivateReport {
    pub version: String,
    pub deleted: Vec<String>,
    /// Stale generations whose deletion failed.
    pub leaked: Vec<String>,
    /// Clients taken over by this version.
    pub claimed: usize,
}

/// One deployed version of the offline cache router.
pub struct OfflineWorker {
    version: String,
    assets: Vec<Url>,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    routes: Arc<dyn RoutePredicate>,
    skip_waiting: bool,
    background: Background,
}

impl OfflineWorker {
    pub fn new(
        version: impl Into<String>, assets: Vec<Url>, storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>,
        routes: Arc<dyn RoutePredicate>,
    ) -> Self {
        Self {
            version: version.into(),
            assets,
            storage,
            network,
            routes,
            skip_waiting: true,
            background: Background::new(),
        }
    }

    /// Do not ask for immediate promotion; the host then waits until no
    /// client is controlled by the previous version.
    pub fn wait_for_clients(mut self) -> Self {
        self.skip_waiting = false;
        self
    }

    /// Build a worker from `cache_name`, `assets` and the routing settings.
    pub fn from_config(
        config: &AppConfig, storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>,
    ) -> Result<Self, ConfigError> {
        let routes = UrlMarkers::from_config(config)?;
        Ok(Self::new(config.cache_name.clone(), config.asset_urls()?, storage, network, Arc::new(routes)))
    }

    /// Name of the cache generation this version owns.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn assets(&self) -> &[Url] {
        &self.assets
    }

    /// Populate the current generation with every asset.
    ///
    /// # Errors
    ///
    /// Returns `Error::InstallFailed` if any asset fetch fails or answers
    /// with a non-ok status; the generation is not created in that case.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        tracing::info!(version = %self.version, assets = self.assets.len(), "installing");

        let requests: Vec<Request> = self.assets.iter().cloned().map(Request::get).collect();
        let responses = try_join_all(requests.iter().map(|r| self.fetch_asset(r))).await?;

        self.storage.open(&self.version).await?;

        for (request, response) in requests.iter().zip(&responses) {
            self.storage
                .put(&self.version, &RequestKey::for_request(request), response)
                .await
                .map_err(|e| Error::InstallFailed(format!("{}: {e}", request.url)))?;
        }

        Ok(InstallReport { version: self.version.clone(), stored: responses.len(), skip_waiting: self.skip_waiting })
    }

    async fn fetch_asset(&self, request: &Request) -> Result<Response, Error> {
        let response = self
            .network
            .fetch(request)
            .await
            .map_err(|e| Error::InstallFailed(format!("{}: {e}", request.url)))?;

        if !response.is_ok() {
            return Err(Error::InstallFailed(format!("{}: status {}", request.url, response.status)));
        }
        Ok(response)
    }

    /// Remove every generation other than the current one.
    ///
    /// Never fails: an unreadable generation list or a failed deletion is
    /// logged and left for the next activation.
    pub async fn activate(&self) -> ActivateReport {
        let mut report = ActivateReport { version: self.version.clone(), ..Default::default() };

        let names = match self.storage.list().await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(version = %self.version, "could not list cache generations: {e}");
                return report;
            }
        };

        let stale: Vec<String> = names.into_iter().filter(|n| *n != self.version).collect();
        let results = join_all(stale.iter().map(|name| self.storage.delete(name))).await;

        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(_) => report.deleted.push(name),
                Err(e) => {
                    tracing::warn!(generation = %name, "stale cache generation leaked: {e}");
                    report.leaked.push(name);
                }
            }
        }

        tracing::info!(
            version = %self.version,
            deleted = report.deleted.len(),
            leaked = report.leaked.len(),
            "activated"
        );
        report
    }

    /// Strategy chosen for a request, decided before any I/O.
    pub fn strategy(&self, request: &Request) -> Strategy {
        self.routes.strategy(&request.url)
    }

    /// Answer one outgoing request.
    ///
    /// # Errors
    ///
    /// Only the cache-first path fails: a storage lookup error, or a network
    /// failure with nothing cached.
    pub async fn handle_fetch(&self, request: Request) -> Result<Served, Error> {
        let strategy = self.strategy(&request);
        tracing::debug!(method = %request.method, url = %request.url, ?strategy, "routing fetch");

        match strategy {
            Strategy::NetworkFirst => Ok(self.network_first(&request).await),
            Strategy::CacheFirst => self.cache_first(request).await,
        }
    }

    async fn network_first(&self, request: &Request) -> Served {
        match self.network.fetch(request).await {
            Ok(response) => Served::new(response, Source::Network),
            Err(e) => {
                tracing::debug!(url = %request.url, "network failed, serving offline body: {e}");
                Served::new(offline_response(), Source::Offline)
            }
        }
    }

    async fn cache_first(&self, request: Request) -> Result<Served, Error> {
        let key = RequestKey::for_request(&request);

        // Only GET entries exist in a generation.
        if request.is_get()
            && let Some(hit) = self.storage.get(&self.version, &key).await?
        {
            tracing::debug!(%key, "cache hit");
            return Ok(Served::new(hit, Source::Cache));
        }

        let response = self.network.fetch(&request).await?;

        // Install created this generation. Once a newer version deletes it,
        // the put fails with UnknownGeneration and is discarded.
        let storage = Arc::clone(&self.storage);
        let version = self.version.clone();
        let stored = response.clone();
        self.background.spawn(format!("populate {key}"), async move { storage.put(&version, &key, &stored).await });

        Ok(Served::new(response, Source::Network))
    }

    /// Wait for pending populate writes. The fetch path never calls this.
    pub async fn settle(&self) {
        self.background.settle().await;
    }
}

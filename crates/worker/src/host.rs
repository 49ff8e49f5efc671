//! Worker lifecycle and client control.
//!
//! The host owns at most one waiting and one active worker version, plus the
//! set of open clients (pages). It enforces the lifecycle order
//! install -> waiting -> activate -> serving, and sends requests from
//! uncontrolled clients straight to the network.
//!
//! All methods take the host by reference from a single owner (the event
//! queue), so no locking is needed.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use offcache_client::Network;
use offcache_core::{Error, Request};

use crate::worker::{ActivateReport, InstallReport, OfflineWorker, Served, Source};

/// Identifier of an open page.
pub type ClientId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

struct Slot {
    worker: Arc<OfflineWorker>,
    state: WorkerState,
    skip_waiting: bool,
}

impl Slot {
    fn info(&self) -> WorkerInfo {
        WorkerInfo { version: self.worker.version().to_string(), state: self.state }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerInfo {
    pub version: String,
    pub state: WorkerState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub id: ClientId,
    /// Version controlling this client, if any.
    pub controller: Option<String>,
}

/// Where one client's request goes, fixed when the event is dispatched.
pub enum FetchTarget {
    Worker(Arc<OfflineWorker>),
    Passthrough(Arc<dyn Network>),
}

impl FetchTarget {
    pub async fn serve(self, request: Request) -> Result<Served, Error> {
        match self {
            FetchTarget::Worker(worker) => worker.handle_fetch(request).await,
            FetchTarget::Passthrough(network) => {
                let response = network.fetch(&request).await?;
                Ok(Served { response, source: Source::Passthrough })
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HostStatus {
    pub active: Option<WorkerInfo>,
    pub waiting: Option<WorkerInfo>,
    pub clients: Vec<ClientInfo>,
}

/// Lifecycle owner for offline workers.
pub struct Host {
    network: Arc<dyn Network>,
    waiting: Option<Slot>,
    active: Option<Slot>,
    clients: BTreeMap<ClientId, Option<String>>,
    next_client: ClientId,
}

impl Host {
    /// `network` serves requests no active worker controls.
    pub fn new(network: Arc<dyn Network>) -> Self {
        Self { network, waiting: None, active: None, clients: BTreeMap::new(), next_client: 1 }
    }

    /// Run the install handler of a new version.
    ///
    /// On success the version becomes the waiting worker, replacing any
    /// earlier waiting one. On failure it is discarded and the active
    /// worker, if any, keeps serving.
    pub async fn install(&mut self, worker: OfflineWorker) -> Result<InstallReport, Error> {
        let worker = Arc::new(worker);
        tracing::debug!(version = worker.version(), state = ?WorkerState::Installing, "worker state");

        match worker.install().await {
            Ok(report) => {
                if let Some(previous) = self.waiting.take() {
                    tracing::info!(version = previous.worker.version(), "waiting worker replaced, now redundant");
                }
                self.waiting = Some(Slot { worker, state: WorkerState::Installed, skip_waiting: report.skip_waiting });
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(
                    version = worker.version(),
                    state = ?WorkerState::Redundant,
                    "install failed, previous worker stays active: {e}"
                );
                Err(e)
            }
        }
    }

    /// Whether the waiting worker may be activated now.
    pub fn can_activate(&self) -> bool {
        match &self.waiting {
            Some(slot) => slot.skip_waiting || self.controlled_by_active() == 0,
            None => false,
        }
    }

    /// Promote the waiting worker: run its activate handler, then claim
    /// every open client.
    ///
    /// # Errors
    ///
    /// Returns `Error::Lifecycle` if nothing is waiting, or if the waiting
    /// version did not ask to skip waiting and clients are still controlled
    /// by the active version.
    pub async fn activate(&mut self) -> Result<ActivateReport, Error> {
        let Some(mut slot) = self.waiting.take() else {
            return Err(Error::Lifecycle("no worker is waiting to activate".into()));
        };

        let controlled = self.controlled_by_active();
        if !slot.skip_waiting && controlled > 0 {
            let version = slot.worker.version().to_string();
            self.waiting = Some(slot);
            return Err(Error::Lifecycle(format!(
                "{version} waits for {controlled} controlled client(s) to close"
            )));
        }

        if let Some(previous) = self.active.take() {
            tracing::info!(version = previous.worker.version(), "active worker replaced, now redundant");
        }

        slot.state = WorkerState::Activating;
        let mut report = slot.worker.activate().await;

        let version = slot.worker.version().to_string();
        for controller in self.clients.values_mut() {
            *controller = Some(version.clone());
        }
        report.claimed = self.clients.len();

        slot.state = WorkerState::Activated;
        self.active = Some(slot);
        Ok(report)
    }

    fn controlled_by_active(&self) -> usize {
        match &self.active {
            Some(active) => self
                .clients
                .values()
                .filter(|c| c.as_deref() == Some(active.worker.version()))
                .count(),
            None => 0,
        }
    }

    /// Open a page. It is controlled by the active worker, if there is one.
    pub fn open_client(&mut self) -> ClientId {
        let id = self.next_client;
        self.next_client += 1;
        let controller = self.active.as_ref().map(|a| a.worker.version().to_string());
        self.clients.insert(id, controller);
        id
    }

    /// Close a page. Returns false for an unknown id.
    pub fn close_client(&mut self, id: ClientId) -> bool {
        self.clients.remove(&id).is_some()
    }

    /// Pick the handler for requests from `client`: the active worker if it
    /// controls the client, the bare network otherwise.
    ///
    /// # Errors
    ///
    /// Returns `Error::Lifecycle` for an unknown client.
    pub fn target(&self, client: ClientId) -> Result<FetchTarget, Error> {
        let controller = self
            .clients
            .get(&client)
            .ok_or_else(|| Error::Lifecycle(format!("unknown client {client}")))?;

        match (self.active(), controller) {
            (Some(active), Some(version)) if active.version() == version => Ok(FetchTarget::Worker(Arc::clone(active))),
            _ => Ok(FetchTarget::Passthrough(Arc::clone(&self.network))),
        }
    }

    /// The active worker, if any.
    pub fn active(&self) -> Option<&Arc<OfflineWorker>> {
        self.active.as_ref().map(|slot| &slot.worker)
    }

    pub fn status(&self) -> HostStatus {
        HostStatus {
            active: self.active.as_ref().map(Slot::info),
            waiting: self.waiting.as_ref().map(Slot::info),
            clients: self
                .clients
                .iter()
                .map(|(id, controller)| ClientInfo { id: *id, controller: controller.clone() })
                .collect(),
        }
    }

    /// Wait for the active worker's detached writes.
    pub async fn settle(&self) {
        if let Some(active) = &self.active {
            active.worker.settle().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::UrlMarkers;
    use offcache_client::FixtureNetwork;
    use offcache_core::{CacheStorage, MemoryStorage, Response};
    use url::Url;

    fn url(path: &str) -> Url {
        Url::parse(&format!("https://cellar.example{path}")).unwrap()
    }

    struct Fixture {
        storage: Arc<MemoryStorage>,
        network: Arc<FixtureNetwork>,
    }

    impl Fixture {
        fn new() -> Self {
            let network = FixtureNetwork::new();
            network.route(url("/index.html").as_str(), Response::new(200, "<html>"));
            Self { storage: Arc::new(MemoryStorage::new()), network: Arc::new(network) }
        }

        fn worker(&self, version: &str) -> OfflineWorker {
            OfflineWorker::new(
                version,
                vec![url("/index.html")],
                self.storage.clone(),
                self.network.clone(),
                Arc::new(UrlMarkers::new(["/search"])),
            )
        }

        fn host(&self) -> Host {
            Host::new(self.network.clone())
        }
    }

    #[tokio::test]
    async fn test_activate_without_waiting_worker() {
        let fx = Fixture::new();
        let mut host = fx.host();
        assert!(matches!(host.activate().await, Err(Error::Lifecycle(_))));
    }

    #[tokio::test]
    async fn test_install_then_activate_claims_clients() {
        let fx = Fixture::new();
        let mut host = fx.host();
        let page = host.open_client();

        host.install(fx.worker("v1")).await.unwrap();
        assert_eq!(host.status().waiting.unwrap().state, WorkerState::Installed);

        let report = host.activate().await.unwrap();
        assert_eq!(report.claimed, 1);

        let status = host.status();
        assert_eq!(status.active.unwrap(), WorkerInfo { version: "v1".into(), state: WorkerState::Activated });
        assert!(status.waiting.is_none());
        assert_eq!(status.clients, vec![ClientInfo { id: page, controller: Some("v1".into()) }]);
    }

    #[tokio::test]
    async fn test_uncontrolled_client_passes_through() {
        let fx = Fixture::new();
        let host = {
            let mut host = fx.host();
            host.open_client();
            host
        };

        let served = host.target(1).unwrap().serve(Request::get(url("/index.html"))).await.unwrap();
        assert_eq!(served.source, Source::Passthrough);
        assert!(fx.storage.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_target_follows_controller() {
        let fx = Fixture::new();
        let mut host = fx.host();
        let before = host.open_client();
        assert!(matches!(host.target(before), Ok(FetchTarget::Passthrough(_))));

        host.install(fx.worker("v1")).await.unwrap();
        host.activate().await.unwrap();
        match host.target(before) {
            Ok(FetchTarget::Worker(worker)) => assert_eq!(worker.version(), "v1"),
            _ => panic!("claimed client should be routed to the active worker"),
        }
    }

    #[test]
    fn test_unknown_client() {
        let fx = Fixture::new();
        let host = fx.host();
        assert!(matches!(host.target(42), Err(Error::Lifecycle(_))));
    }

    #[tokio::test]
    async fn test_controlled_client_served_from_cache() {
        let fx = Fixture::new();
        let mut host = fx.host();
        host.install(fx.worker("v1")).await.unwrap();
        host.activate().await.unwrap();
        let page = host.open_client();

        fx.network.set_online(false);
        let served = host.target(page).unwrap().serve(Request::get(url("/index.html"))).await.unwrap();
        assert_eq!(served.source, Source::Cache);
        assert_eq!(served.response.text(), "<html>");
    }

    #[tokio::test]
    async fn test_failed_install_keeps_previous_active() {
        let fx = Fixture::new();
        let mut host = fx.host();
        host.install(fx.worker("v1")).await.unwrap();
        host.activate().await.unwrap();

        fx.network.set_online(false);
        assert!(host.install(fx.worker("v2")).await.is_err());
        assert_eq!(fx.storage.list().await.unwrap(), vec!["v1".to_string()]);

        let status = host.status();
        assert_eq!(status.active.unwrap().version, "v1");
        assert!(status.waiting.is_none());
        assert!(!host.can_activate());
    }

    #[tokio::test]
    async fn test_new_version_retires_old_generation() {
        let fx = Fixture::new();
        let mut host = fx.host();
        let page = host.open_client();

        host.install(fx.worker("v1")).await.unwrap();
        host.activate().await.unwrap();
        host.install(fx.worker("v2")).await.unwrap();
        assert!(host.can_activate());

        let report = host.activate().await.unwrap();
        assert_eq!(report.deleted, vec!["v1".to_string()]);
        assert_eq!(fx.storage.list().await.unwrap(), vec!["v2".to_string()]);
        assert_eq!(host.status().clients[0], ClientInfo { id: page, controller: Some("v2".into()) });
    }

    #[tokio::test]
    async fn test_waiting_worker_blocked_by_controlled_client() {
        let fx = Fixture::new();
        let mut host = fx.host();
        host.install(fx.worker("v1")).await.unwrap();
        host.activate().await.unwrap();
        let page = host.open_client();

        let report = host.install(fx.worker("v2").wait_for_clients()).await.unwrap();
        assert!(!report.skip_waiting);
        assert!(!host.can_activate());
        assert!(matches!(host.activate().await, Err(Error::Lifecycle(_))));
        assert_eq!(host.status().waiting.unwrap().version, "v2");

        assert!(host.close_client(page));
        assert!(host.can_activate());
        host.activate().await.unwrap();
        assert_eq!(host.status().active.unwrap().version, "v2");
    }
}

//! Ordered event dispatch.
//!
//! Lifecycle and client events are admitted one at a time: each runs to
//! completion on the host before the next is taken off the queue, so install
//! is acknowledged before activate begins. A fetch event only picks its
//! handler in order; the handler then runs on its own task, so a slow
//! request never holds up later ones. A fetch queued after an activate is
//! therefore always served by the new version.

use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};

use offcache_core::{Error, Request};

use crate::host::{ClientId, Host, HostStatus};
use crate::worker::{ActivateReport, InstallReport, OfflineWorker, Served};

type Reply<T> = oneshot::Sender<T>;

enum Event {
    Install { worker: Box<OfflineWorker>, reply: Reply<Result<InstallReport, Error>> },
    Activate { reply: Reply<Result<ActivateReport, Error>> },
    Fetch { client: ClientId, request: Request, reply: Reply<Result<Served, Error>> },
    OpenClient { reply: Reply<ClientId> },
    CloseClient { client: ClientId, reply: Reply<bool> },
    Status { reply: Reply<HostStatus> },
    Settle { reply: Reply<()> },
}

/// What [`EventQueue::register`] did with a new version.
#[derive(Debug, Clone)]
pub struct Registration {
    pub install: InstallReport,
    /// Present when the version was promoted right away.
    pub activate: Option<ActivateReport>,
}

/// Handle for sending events to a host running on its own task.
#[derive(Clone)]
pub struct EventQueue {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventQueue {
    /// Move `host` onto a dispatcher task and return a handle to it.
    ///
    /// The task ends when every handle has been dropped.
    pub fn spawn(host: Host) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(dispatch(host, rx));
        (Self { tx }, task)
    }

    async fn call<T>(&self, event: impl FnOnce(Reply<T>) -> Event) -> Result<T, Error> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(event(reply)).map_err(|_| Error::QueueClosed)?;
        rx.await.map_err(|_| Error::QueueClosed)
    }

    pub async fn install(&self, worker: OfflineWorker) -> Result<InstallReport, Error> {
        let worker = Box::new(worker);
        self.call(|reply| Event::Install { worker, reply }).await?
    }

    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        self.call(|reply| Event::Activate { reply }).await?
    }

    /// Install `worker` and, if the host allows it, activate it as a
    /// separate event right after.
    pub async fn register(&self, worker: OfflineWorker) -> Result<Registration, Error> {
        let install = self.install(worker).await?;
        let promote = install.skip_waiting || self.status().await?.active.is_none();
        let activate = if promote { Some(self.activate().await?) } else { None };
        Ok(Registration { install, activate })
    }

    pub async fn fetch(&self, client: ClientId, request: Request) -> Result<Served, Error> {
        self.call(|reply| Event::Fetch { client, request, reply }).await?
    }

    pub async fn open_client(&self) -> Result<ClientId, Error> {
        self.call(|reply| Event::OpenClient { reply }).await
    }

    pub async fn close_client(&self, client: ClientId) -> Result<bool, Error> {
        self.call(|reply| Event::CloseClient { client, reply }).await
    }

    pub async fn status(&self) -> Result<HostStatus, Error> {
        self.call(|reply| Event::Status { reply }).await
    }

    /// Wait for in-flight fetches, then for the active worker's detached
    /// cache writes.
    pub async fn settle(&self) -> Result<(), Error> {
        self.call(|reply| Event::Settle { reply }).await
    }
}

async fn dispatch(mut host: Host, mut rx: mpsc::UnboundedReceiver<Event>) {
    let mut inflight = JoinSet::new();

    // A dropped reply receiver means the caller went away; the event still
    // ran, so the send error is ignored.
    while let Some(event) = rx.recv().await {
        while inflight.try_join_next().is_some() {}

        match event {
            Event::Install { worker, reply } => {
                let _ = reply.send(host.install(*worker).await);
            }
            Event::Activate { reply } => {
                let _ = reply.send(host.activate().await);
            }
            Event::Fetch { client, request, reply } => match host.target(client) {
                Ok(target) => {
                    inflight.spawn(async move {
                        let _ = reply.send(target.serve(request).await);
                    });
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Event::OpenClient { reply } => {
                let _ = reply.send(host.open_client());
            }
            Event::CloseClient { client, reply } => {
                let _ = reply.send(host.close_client(client));
            }
            Event::Status { reply } => {
                let _ = reply.send(host.status());
            }
            Event::Settle { reply } => {
                while inflight.join_next().await.is_some() {}
                host.settle().await;
                let _ = reply.send(());
            }
        }
    }
    tracing::debug!("event queue closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::UrlMarkers;
    use crate::worker::Source;
    use offcache_client::FixtureNetwork;
    use offcache_core::{CacheStorage, MemoryStorage, Response};
    use offcache_client::Network;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use url::Url;

    fn url(path: &str) -> Url {
        Url::parse(&format!("https://cellar.example{path}")).unwrap()
    }

    struct Fixture {
        storage: Arc<MemoryStorage>,
        network: Arc<FixtureNetwork>,
        queue: EventQueue,
    }

    impl Fixture {
        fn new() -> Self {
            let storage = Arc::new(MemoryStorage::new());
            let network = Arc::new(FixtureNetwork::new());
            let (queue, _task) = EventQueue::spawn(Host::new(network.clone()));
            Self { storage, network, queue }
        }

        fn worker(&self, version: &str, assets: &[&str]) -> OfflineWorker {
            OfflineWorker::new(
                version,
                assets.iter().map(|a| url(a)).collect(),
                self.storage.clone(),
                self.network.clone(),
                Arc::new(UrlMarkers::new(["/search", "/wine"])),
            )
        }
    }

    #[tokio::test]
    async fn test_register_installs_then_activates() {
        let fx = Fixture::new();
        fx.network.route(url("/index.html").as_str(), Response::new(200, "<html>"));
        fx.storage.open("cellar-v0").await.unwrap();

        let registration = fx.queue.register(fx.worker("cellar-v1", &["/index.html"])).await.unwrap();
        assert_eq!(registration.install.stored, 1);
        let activate = registration.activate.unwrap();
        assert_eq!(activate.deleted, vec!["cellar-v0".to_string()]);
        assert_eq!(fx.storage.list().await.unwrap(), vec!["cellar-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_register_failure_propagates() {
        let fx = Fixture::new();
        fx.network.set_online(false);

        let result = fx.queue.register(fx.worker("cellar-v1", &["/index.html"])).await;
        assert!(matches!(result, Err(Error::InstallFailed(_))));
        assert!(fx.queue.status().await.unwrap().active.is_none());
    }

    #[tokio::test]
    async fn test_index_and_search_scenario() {
        let fx = Fixture::new();
        fx.network.route(url("/index.html").as_str(), Response::new(200, "<html>"));

        let client = fx.queue.open_client().await.unwrap();
        let registration = fx.queue.register(fx.worker("cellar-v1", &[])).await.unwrap();
        assert_eq!(registration.activate.unwrap().claimed, 1);

        let first = fx.queue.fetch(client, Request::get(url("/index.html"))).await.unwrap();
        assert_eq!(first.source, Source::Network);
        assert_eq!(first.response.text(), "<html>");
        fx.queue.settle().await.unwrap();

        fx.network.set_online(false);
        let cached = fx.queue.fetch(client, Request::get(url("/index.html"))).await.unwrap();
        assert_eq!(cached.source, Source::Cache);
        assert_eq!(cached.response.text(), "<html>");

        let search = fx.queue.fetch(client, Request::get(url("/search?q=x"))).await.unwrap();
        assert_eq!(search.source, Source::Offline);
        let body: serde_json::Value = serde_json::from_slice(&search.response.body).unwrap();
        assert_eq!(body, serde_json::json!({"error": "offline", "results": []}));
    }

    #[tokio::test]
    async fn test_events_run_in_order() {
        let fx = Fixture::new();
        fx.network.route(url("/index.html").as_str(), Response::new(200, "<html>"));
        let client = fx.queue.open_client().await.unwrap();

        let (install, activate, fetch) = tokio::join!(
            fx.queue.install(fx.worker("cellar-v1", &["/index.html"])),
            fx.queue.activate(),
            fx.queue.fetch(client, Request::get(url("/index.html"))),
        );

        assert!(install.is_ok());
        assert_eq!(activate.unwrap().claimed, 1);
        assert_eq!(fetch.unwrap().source, Source::Cache);
        assert_eq!(fx.network.call_count(), 1);
    }

    /// Delays every answer for URLs containing `slow`, after recording the
    /// call on the inner fixture.
    struct SlowNetwork {
        inner: Arc<FixtureNetwork>,
        slow: &'static str,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl Network for SlowNetwork {
        async fn fetch(&self, request: &Request) -> Result<Response, Error> {
            let response = self.inner.fetch(request).await;
            if request.url.as_str().contains(self.slow) {
                tokio::time::sleep(self.delay).await;
            }
            response
        }
    }

    #[tokio::test]
    async fn test_slow_fetch_does_not_block_cache_hit() {
        let storage = Arc::new(MemoryStorage::new());
        let fixture = Arc::new(FixtureNetwork::new());
        fixture.route(url("/index.html").as_str(), Response::new(200, "<html>"));
        let network = Arc::new(SlowNetwork { inner: fixture.clone(), slow: "/search", delay: Duration::from_secs(5) });

        let (queue, _task) = EventQueue::spawn(Host::new(network.clone()));
        let client = queue.open_client().await.unwrap();
        let worker = OfflineWorker::new(
            "cellar-v1",
            vec![url("/index.html")],
            storage,
            network,
            Arc::new(UrlMarkers::new(["/search"])),
        );
        queue.register(worker).await.unwrap();

        let search = tokio::spawn({
            let queue = queue.clone();
            async move { queue.fetch(client, Request::get(url("/search?q=x"))).await }
        });
        while fixture.calls_to(url("/search?q=x").as_str()) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let start = Instant::now();
        let hit = tokio::time::timeout(Duration::from_secs(1), queue.fetch(client, Request::get(url("/index.html"))))
            .await
            .expect("cache hit waited on the slow request")
            .unwrap();
        assert_eq!(hit.source, Source::Cache);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!search.is_finished());
        search.abort();
    }

    #[tokio::test]
    async fn test_fetch_after_activate_uses_new_version() {
        let fx = Fixture::new();
        fx.network.route(url("/index.html").as_str(), Response::new(200, "<html>"));
        let client = fx.queue.open_client().await.unwrap();
        fx.queue.register(fx.worker("cellar-v1", &["/index.html"])).await.unwrap();
        fx.queue.install(fx.worker("cellar-v2", &["/index.html"])).await.unwrap();

        let (activate, fetch) = tokio::join!(
            fx.queue.activate(),
            fx.queue.fetch(client, Request::get(url("/index.html"))),
        );
        assert_eq!(activate.unwrap().deleted, vec!["cellar-v1".to_string()]);
        assert_eq!(fetch.unwrap().source, Source::Cache);
        assert_eq!(fx.queue.status().await.unwrap().clients[0].controller.as_deref(), Some("cellar-v2"));
    }

    #[tokio::test]
    async fn test_close_client() {
        let fx = Fixture::new();
        let client = fx.queue.open_client().await.unwrap();
        assert!(fx.queue.close_client(client).await.unwrap());
        assert!(!fx.queue.close_client(client).await.unwrap());
        assert!(fx.queue.status().await.unwrap().clients.is_empty());
    }
}

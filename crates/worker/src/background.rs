//! Detached side effects of the fetch handler.
//!
//! Cache populate writes run here so the response path never waits on
//! storage. A failed task is logged and dropped; nobody observes it. Do not
//! replace this with an awaited write: the caller already has its response.

use std::future::Future;
use std::sync::Mutex;

use tokio::task::JoinSet;

use offcache_core::Error;

/// Set of fire-and-forget tasks that can be drained on demand.
#[derive(Default)]
pub struct Background {
    tasks: Mutex<JoinSet<()>>,
}

impl Background {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` detached. Its error, if any, is discarded after logging.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, label: String, task: F)
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let Ok(mut tasks) = self.tasks.lock() else {
            tracing::warn!(%label, "background set poisoned; task dropped");
            return;
        };
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            if let Err(e) = task.await {
                tracing::debug!(%label, "background task failed, discarded: {e}");
            }
        });
    }

    /// Wait until every task spawned so far, and any they spawn, finished.
    pub async fn settle(&self) {
        loop {
            let mut drained = match self.tasks.lock() {
                Ok(mut tasks) => std::mem::take(&mut *tasks),
                Err(_) => return,
            };
            if drained.is_empty() {
                return;
            }
            while drained.join_next().await.is_some() {}
        }
    }
}

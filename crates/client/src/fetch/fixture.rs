//! Scripted network used to drive the router without real I/O.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use offcache_core::{Error, Request, Response};

use super::Network;

/// A network whose responses are registered up front.
///
/// Unregistered URLs answer 404, like a real server would. Every call is
/// recorded, including calls made while offline.
pub struct FixtureNetwork {
    routes: Mutex<HashMap<String, Response>>,
    failing: Mutex<HashSet<String>>,
    online: AtomicBool,
    calls: Mutex<Vec<Request>>,
}

impl Default for FixtureNetwork {
    fn default() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            online: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FixtureNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with `response`, replacing any earlier route.
    pub fn route(&self, url: &str, response: Response) -> &Self {
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(url.to_string(), response);
        }
        self
    }

    /// Make fetches of `url` fail at the transport level.
    pub fn fail(&self, url: &str) -> &Self {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(url.to_string());
        }
        self
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Total number of fetches attempted.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Number of fetches attempted for one URL.
    pub fn calls_to(&self, url: &str) -> usize {
        self.calls
            .lock()
            .map(|c| c.iter().filter(|r| r.url.as_str() == url).count())
            .unwrap_or(0)
    }

    /// The most recent request made for `url`, headers included.
    pub fn last_request(&self, url: &str) -> Option<Request> {
        let calls = self.calls.lock().ok()?;
        calls.iter().rev().find(|r| r.url.as_str() == url).cloned()
    }
}

#[async_trait::async_trait]
impl Network for FixtureNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let url = request.url.to_string();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }

        if !self.online.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("{url}: offline")));
        }
        if self.failing.lock().map(|f| f.contains(&url)).unwrap_or(false) {
            return Err(Error::Network(format!("{url}: connection reset")));
        }

        let routed = self.routes.lock().ok().and_then(|routes| routes.get(&url).cloned());
        Ok(routed.unwrap_or_else(|| Response::new(404, "not found")))
    }
}

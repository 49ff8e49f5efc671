//! Network access for the router.
//!
//! ### Contract
//! - A resolved response with any HTTP status is a success; only transport
//!   failures, timeouts and oversize bodies are errors.
//! - Exactly one attempt per call: no retries, no backoff.
//!
//! ### Implementations
//! - [`HttpNetwork`]: reqwest client with rustls, compression, a redirect
//!   limit and a body size cap.
//! - [`FixtureNetwork`]: scripted responses with an offline switch and call
//!   counters, for driving the router deterministically.

pub mod fixture;
pub mod url;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reqwest::{Client, Method, header};

pub use fixture::FixtureNetwork;
pub use self::url::{UrlError, resolve};

use offcache_core::{Error, Request, Response};

/// The network as seen by the router.
#[async_trait::async_trait]
pub trait Network: Send + Sync {
    /// Perform one fetch of `request`.
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

/// Configuration for the HTTP network.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "offcache/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "offcache/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&offcache_core::AppConfig> for FetchConfig {
    fn from(config: &offcache_core::AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// HTTP network backed by reqwest.
pub struct HttpNetwork {
    http: Client,
    config: FetchConfig,
}

impl HttpNetwork {
    /// Create a new HTTP network with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    fn too_large(&self, len: usize) -> Error {
        Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes))
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(url.to_string())
    } else {
        Error::Network(format!("{url}: {err}"))
    }
}

/// Declared body length, saturating where `usize` is narrower than `u64`.
fn declared_len(len: u64) -> usize {
    usize::try_from(len).unwrap_or(usize::MAX)
}

/// Flatten a header map, joining repeated names with ", ".
fn collect_headers(headers: &header::HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else { continue };
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    out
}

#[async_trait::async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();
        let url = request.url.as_str();

        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid method {}: {}", request.method, e)))?;

        let mut builder = self.http.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| transport_error(url, e))?;

        if let Some(len) = response.content_length() {
            let len = declared_len(len);
            if len > self.config.max_bytes {
                return Err(self.too_large(len));
            }
        }

        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());

        let body = response.bytes().await.map_err(|e| transport_error(url, e))?;

        if body.len() > self.config.max_bytes {
            return Err(self.too_large(body.len()));
        }

        tracing::debug!(
            "fetched {} {} -> {} in {}ms ({} bytes)",
            request.method,
            url,
            status,
            start.elapsed().as_millis(),
            body.len()
        );

        Ok(Response { status, headers, body })
    }
}

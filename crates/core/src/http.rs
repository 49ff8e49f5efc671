//! Request and response values passed between the router, the network and
//! cache storage.

use std::collections::BTreeMap;

use bytes::Bytes;
use url::Url;

/// Content type of the synthesized offline body.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// An outgoing request as seen by the fetch handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Upper-case HTTP method.
    pub method: String,
    pub url: Url,
    /// Header names are stored lower-cased.
    pub headers: BTreeMap<String, String>,
}

impl Request {
    /// A GET request with no headers.
    pub fn get(url: Url) -> Self {
        Self { method: "GET".to_string(), url, headers: BTreeMap::new() }
    }

    /// A request with an arbitrary method.
    pub fn new(method: &str, url: Url) -> Self {
        Self { method: method.trim().to_ascii_uppercase(), url, headers: BTreeMap::new() }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }
}

/// A response snapshot.
///
/// The body is reference counted, so cloning a response for the cache does
/// not copy the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    /// Header names are stored lower-cased.
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self { status, headers: BTreeMap::new(), body: body.into() }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Status in the 200-299 range.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

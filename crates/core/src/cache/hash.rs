//! Cache key derivation.

use sha2::{Digest, Sha256};

use crate::http::Request;

/// Key under which a request is stored in a cache generation.
///
/// Two requests share a key when method and URL match after the fragment
/// is dropped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn for_request(request: &Request) -> Self {
        let mut url = request.url.clone();
        url.set_fragment(None);
        Self { method: request.method.clone(), url: url.to_string() }
    }

    /// Row id used by the SQLite backend.
    pub fn digest(&self) -> String {
        compute_cache_key(&self.method, &self.url)
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Compute a content-addressed key for a method and URL.
pub fn compute_cache_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

//! The cache storage service injected into the router.
//!
//! A storage holds named generations; each generation maps request keys to
//! stored responses. Generation names are listed in creation order and keys
//! in first-insertion order.

use crate::Error;
use crate::cache::hash::RequestKey;
use crate::http::Response;

/// Process-wide keyed response store.
#[async_trait::async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the generation if it does not exist yet.
    async fn open(&self, name: &str) -> Result<(), Error>;

    /// Remove a generation and all of its entries.
    ///
    /// Returns false when no generation had that name.
    async fn delete(&self, name: &str) -> Result<bool, Error>;

    /// Names of all live generations.
    async fn list(&self) -> Result<Vec<String>, Error>;

    /// Look up a stored response. A missing generation is a miss.
    async fn get(&self, name: &str, key: &RequestKey) -> Result<Option<Response>, Error>;

    /// Store a response, replacing any previous entry for the key.
    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<(), Error>;

    /// Keys stored in a generation.
    async fn keys(&self, name: &str) -> Result<Vec<RequestKey>, Error>;

    async fn has(&self, name: &str) -> Result<bool, Error> {
        Ok(self.list().await?.iter().any(|n| n == name))
    }
}

/// Reject pairs a cache generation cannot hold.
pub fn ensure_storable(key: &RequestKey, response: &Response) -> Result<(), Error> {
    if key.method != "GET" {
        return Err(Error::Uncacheable(format!("{key}: only GET requests can be stored")));
    }
    if response.status == 206 {
        return Err(Error::Uncacheable(format!("{key}: partial content")));
    }
    Ok(())
}

//! In-memory cache storage.
//!
//! Used for tests and for running without a database file. Deletions can be
//! made to fail per generation to exercise the best-effort cleanup path.

use std::collections::HashSet;
use std::sync::Mutex;

use tokio::sync::RwLock;

use super::hash::RequestKey;
use super::storage::{CacheStorage, ensure_storable};
use crate::Error;
use crate::http::Response;

struct Generation {
    name: String,
    entries: Vec<(RequestKey, Response)>,
}

/// Cache storage held entirely in process memory.
#[derive(Default)]
pub struct MemoryStorage {
    generations: RwLock<Vec<Generation>>,
    failing_deletes: Mutex<HashSet<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `delete` of `name` fail with a storage error.
    pub fn fail_deletes_of(&self, name: &str) {
        if let Ok(mut failing) = self.failing_deletes.lock() {
            failing.insert(name.to_string());
        }
    }

    fn delete_blocked(&self, name: &str) -> bool {
        self.failing_deletes.lock().map(|f| f.contains(name)).unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<(), Error> {
        let mut generations = self.generations.write().await;
        if !generations.iter().any(|g| g.name == name) {
            generations.push(Generation { name: name.to_string(), entries: Vec::new() });
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        if self.delete_blocked(name) {
            return Err(Error::Storage(format!("delete of {name} refused")));
        }
        let mut generations = self.generations.write().await;
        let before = generations.len();
        generations.retain(|g| g.name != name);
        Ok(generations.len() != before)
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        Ok(self.generations.read().await.iter().map(|g| g.name.clone()).collect())
    }

    async fn get(&self, name: &str, key: &RequestKey) -> Result<Option<Response>, Error> {
        let generations = self.generations.read().await;
        Ok(generations
            .iter()
            .find(|g| g.name == name)
            .and_then(|g| g.entries.iter().find(|(k, _)| k == key))
            .map(|(_, response)| response.clone()))
    }

    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<(), Error> {
        ensure_storable(key, response)?;
        let mut generations = self.generations.write().await;
        let generation = generations
            .iter_mut()
            .find(|g| g.name == name)
            .ok_or_else(|| Error::UnknownGeneration(name.to_string()))?;

        match generation.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = response.clone(),
            None => generation.entries.push((key.clone(), response.clone())),
        }
        Ok(())
    }

    async fn keys(&self, name: &str) -> Result<Vec<RequestKey>, Error> {
        let generations = self.generations.read().await;
        generations
            .iter()
            .find(|g| g.name == name)
            .map(|g| g.entries.iter().map(|(k, _)| k.clone()).collect())
            .ok_or_else(|| Error::UnknownGeneration(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(url: &str) -> RequestKey {
        RequestKey { method: "GET".to_string(), url: url.to_string() }
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let storage = MemoryStorage::new();
        storage.open("v1").await.unwrap();
        storage.put("v1", &key("https://a/1"), &Response::new(200, "one")).await.unwrap();
        storage.open("v1").await.unwrap();

        assert_eq!(storage.list().await.unwrap(), vec!["v1".to_string()]);
        assert!(storage.get("v1", &key("https://a/1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_in_creation_order() {
        let storage = MemoryStorage::new();
        storage.open("b").await.unwrap();
        storage.open("a").await.unwrap();
        assert_eq!(storage.list().await.unwrap(), vec!["b".to_string(), "a".to_string()]);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let storage = MemoryStorage::new();
        storage.open("v1").await.unwrap();
        storage.put("v1", &key("https://a/1"), &Response::new(200, "old")).await.unwrap();
        storage.put("v1", &key("https://a/1"), &Response::new(200, "new")).await.unwrap();

        let stored = storage.get("v1", &key("https://a/1")).await.unwrap().unwrap();
        assert_eq!(stored.text(), "new");
        assert_eq!(storage.keys("v1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_put_unknown_generation() {
        let storage = MemoryStorage::new();
        let result = storage.put("missing", &key("https://a/1"), &Response::new(200, "x")).await;
        assert!(matches!(result, Err(Error::UnknownGeneration(_))));
    }

    #[tokio::test]
    async fn test_get_unknown_generation_is_miss() {
        let storage = MemoryStorage::new();
        assert!(storage.get("missing", &key("https://a/1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let storage = MemoryStorage::new();
        storage.open("v1").await.unwrap();
        assert!(storage.delete("v1").await.unwrap());
        assert!(!storage.delete("v1").await.unwrap());
        assert!(!storage.has("v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_failing_delete() {
        let storage = MemoryStorage::new();
        storage.open("v0").await.unwrap();
        storage.fail_deletes_of("v0");

        assert!(matches!(storage.delete("v0").await, Err(Error::Storage(_))));
        assert!(storage.has("v0").await.unwrap());
    }
}

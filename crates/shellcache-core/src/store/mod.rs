//! Persistent named store capability.
//!
//! The host provides a set of named stores, each an insertion-ordered mapping
//! from `RequestKey` to `Response`. The engine only decides which stores exist
//! and which entries move between them.
//!
//! Two backends ship with the crate:
//! - `MemoryStorage`: in-process, used by tests and embedders
//! - `DiskStorage`: one JSON document per store under a cache directory

pub mod disk;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::models::{RequestKey, Response};

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

/// A single named store.
#[async_trait]
pub trait Store: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, key: &RequestKey) -> Result<Option<Response>, StoreError>;

    /// Insert or replace. A replaced key moves to the newest position.
    async fn put(&self, key: RequestKey, response: Response) -> Result<(), StoreError>;

    async fn delete(&self, key: &RequestKey) -> Result<bool, StoreError>;

    /// Keys in insertion order, oldest first.
    async fn keys(&self) -> Result<Vec<RequestKey>, StoreError>;

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.keys().await?.len())
    }
}

/// The set of named stores visible to this origin.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a store, creating it if absent.
    async fn open(&self, name: &str) -> Result<Arc<dyn Store>, StoreError>;

    /// Open a store only if it already exists.
    async fn lookup(&self, name: &str) -> Result<Option<Arc<dyn Store>>, StoreError>;

    async fn names(&self) -> Result<Vec<String>, StoreError>;

    /// Delete a whole store. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool, StoreError>;

    async fn has(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.names().await?.iter().any(|n| n == name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
    pub key: RequestKey,
    pub response: Response,
}

/// Insertion-ordered entries of one store, shared by both backends.
///
/// Keys are unique; position in the vector is the eviction order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct EntryLog {
    entries: Vec<StoredEntry>,
}

impl EntryLog {
    pub fn get(&self, key: &RequestKey) -> Option<&Response> {
        self.entries.iter().find(|e| &e.key == key).map(|e| &e.response)
    }

    pub fn put(&mut self, key: RequestKey, response: Response) {
        self.entries.retain(|e| e.key != key);
        self.entries.push(StoredEntry { key, response });
    }

    pub fn delete(&mut self, key: &RequestKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| &e.key != key);
        self.entries.len() != before
    }

    pub fn keys(&self) -> Vec<RequestKey> {
        self.entries.iter().map(|e| e.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(path: &str) -> RequestKey {
        RequestKey {
            method: "GET".to_string(),
            url: format!("https://app.example{}", path),
        }
    }

    #[test]
    fn test_entry_log_replace_moves_to_end() {
        let mut log = EntryLog::default();
        log.put(key("/a"), Response::new(200, "a1"));
        log.put(key("/b"), Response::new(200, "b"));
        log.put(key("/a"), Response::new(200, "a2"));

        assert_eq!(log.len(), 2);
        assert_eq!(log.keys(), vec![key("/b"), key("/a")]);
        assert_eq!(log.get(&key("/a")).unwrap().text(), "a2");
    }

    #[test]
    fn test_entry_log_delete() {
        let mut log = EntryLog::default();
        log.put(key("/a"), Response::new(200, "a"));
        assert!(log.delete(&key("/a")));
        assert!(!log.delete(&key("/a")));
        assert_eq!(log.len(), 0);
    }
}
